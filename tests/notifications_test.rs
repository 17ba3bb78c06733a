use redobj::*;
use std::sync::{Arc, Mutex};

#[object]
pub struct Task {
    #[pk]
    pub _id: i64,
    pub title: String,
    pub done: bool,
    pub steps: Vec<String>,
}

fn task(id: i64, title: &str) -> Task {
    Task { _id: id, title: title.to_string(), done: false, steps: Vec::new() }
}

#[test]
fn object_observer_receives_named_property_changes() {
    let realm = Realm::temp("notify_object", true).unwrap();
    let mut managed = realm.write(|realm| realm.add(task(1, "write tests"))).unwrap();

    let seen: Arc<Mutex<Vec<ObjectChange>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let token = managed.observe(move |change| sink.lock().unwrap().push(change)).unwrap();

    realm
        .write(|_| {
            managed.done.set(true)?;
            managed.title.set("write more tests".to_string())
        })
        .unwrap();

    let changes = seen.lock().unwrap();
    assert_eq!(changes.len(), 1);
    let change = &changes[0];
    assert!(!change.is_deleted);
    let names: Vec<&str> = change.property_changes.iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["done", "title"]);
    let done = change.property_changes.iter().find(|p| p.name == "done").unwrap();
    assert_eq!(done.old, Some(Value::Bool(false)));
    assert_eq!(done.new, Some(Value::Bool(true)));
    drop(changes);
    drop(token);
}

#[test]
fn object_observer_reports_deletion() {
    let realm = Realm::temp("notify_delete", true).unwrap();
    let managed = realm.write(|realm| realm.add(task(2, "gone soon"))).unwrap();

    let seen: Arc<Mutex<Vec<ObjectChange>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _token = managed.observe(move |change| sink.lock().unwrap().push(change)).unwrap();

    realm.write(|realm| realm.remove(&managed)).unwrap();
    let changes = seen.lock().unwrap();
    assert_eq!(changes.len(), 1);
    assert!(changes[0].is_deleted);
}

#[test]
fn collection_observer_batches_per_commit() {
    let realm = Realm::temp("notify_collection", true).unwrap();
    let mut managed = realm.write(|realm| realm.add(task(3, "stepwise"))).unwrap();

    let seen: Arc<Mutex<Vec<CollectionChange>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _token = managed.steps.observe(move |change| sink.lock().unwrap().push(change)).unwrap();

    realm
        .write(|_| {
            managed.steps.push_back("a".to_string())?;
            managed.steps.push_back("b".to_string())?;
            managed.steps.push_back("c".to_string())
        })
        .unwrap();
    {
        let changes = seen.lock().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].insertions.len(), 3);
        assert!(changes[0].deletions.is_empty());
    }

    realm.write(|_| managed.steps.clear()).unwrap();
    {
        let changes = seen.lock().unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1].deletions.len(), 3);
    }
}

#[test]
fn collection_observer_sees_root_deletion() {
    let realm = Realm::temp("notify_root_deleted", true).unwrap();
    let mut managed = realm.write(|realm| realm.add(task(4, "short-lived"))).unwrap();
    realm.write(|_| managed.steps.push_back("only".to_string())).unwrap();

    let seen: Arc<Mutex<Vec<CollectionChange>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _token = managed.steps.observe(move |change| sink.lock().unwrap().push(change)).unwrap();

    realm.write(|realm| realm.remove(&managed)).unwrap();
    let changes = seen.lock().unwrap();
    assert_eq!(changes.len(), 1);
    assert!(changes[0].root_deleted);
}

#[test]
fn results_observer_diffs_membership() {
    let realm = Realm::temp("notify_results", true).unwrap();
    let results = realm.objects::<Task>().unwrap();

    let seen: Arc<Mutex<Vec<ResultsChange>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _token = results.observe(move |change| sink.lock().unwrap().push(change)).unwrap();

    realm
        .write(|realm| {
            realm.add(task(5, "a"))?;
            realm.add(task(6, "b"))?;
            realm.add(task(7, "c"))?;
            Ok(())
        })
        .unwrap();
    {
        let changes = seen.lock().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].insertions, vec![0, 1, 2]);
    }

    let mut first = results.get(0).unwrap();
    realm.write(|_| first.title.set("a2".to_string())).unwrap();
    {
        let changes = seen.lock().unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1].modifications.len(), 1);
    }

    realm.write(|realm| realm.remove(&first)).unwrap();
    {
        let changes = seen.lock().unwrap();
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[2].deletions.len(), 1);
    }
}

#[test]
fn unregistered_tokens_stop_delivery() {
    let realm = Realm::temp("notify_unregister", true).unwrap();
    let mut managed = realm.write(|realm| realm.add(task(8, "quiet"))).unwrap();

    let seen: Arc<Mutex<Vec<ObjectChange>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let token = managed.observe(move |change| sink.lock().unwrap().push(change)).unwrap();
    token.unregister();

    realm.write(|_| managed.done.set(true)).unwrap();
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn frozen_sessions_reject_observers() {
    let realm = Realm::temp("notify_frozen", true).unwrap();
    let managed = realm.write(|realm| realm.add(task(9, "cold"))).unwrap();
    let frozen = managed.freeze().unwrap();
    let err = frozen.observe(|_| {}).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Notifications are not available on frozen collections since they do not change."
    );
}
