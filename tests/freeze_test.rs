use redobj::*;

#[object]
pub struct Account {
    #[pk]
    pub _id: i64,
    pub owner: String,
    pub balance: i64,
}

fn account(id: i64, owner: &str, balance: i64) -> Account {
    Account { _id: id, owner: owner.to_string(), balance }
}

#[test]
fn frozen_objects_pin_their_snapshot() {
    let realm = Realm::temp("freeze_pin", true).unwrap();
    let mut live = realm.write(|realm| realm.add(account(1, "Ann", 100))).unwrap();

    let frozen = live.freeze().unwrap();
    assert!(frozen.is_frozen());
    assert!(!live.is_frozen());

    realm.write(|_| live.balance.set(250)).unwrap();
    assert_eq!(live.balance.get().unwrap(), 250);
    assert_eq!(frozen.balance.get().unwrap(), 100);
}

#[test]
fn freezing_a_frozen_object_is_identity() {
    let realm = Realm::temp("freeze_identity", true).unwrap();
    let live = realm.write(|realm| realm.add(account(2, "Bob", 10))).unwrap();

    let frozen = live.freeze().unwrap();
    let refrozen = frozen.freeze().unwrap();
    assert_eq!(frozen, refrozen);
    assert!(frozen != live);
    assert_eq!(live, live.clone());
}

#[test]
fn thaw_returns_to_the_live_session() {
    let realm = Realm::temp("freeze_thaw", true).unwrap();
    let mut live = realm.write(|realm| realm.add(account(3, "Cid", 70))).unwrap();
    let frozen = live.freeze().unwrap();

    realm.write(|_| live.balance.set(90)).unwrap();
    let thawed = frozen.thaw().unwrap();
    assert!(!thawed.is_frozen());
    assert_eq!(thawed.balance.get().unwrap(), 90);
    assert_eq!(thawed, live);
}

#[test]
fn invalidated_objects_cannot_be_thawed() {
    let realm = Realm::temp("freeze_thaw_invalid", true).unwrap();
    let live = realm.write(|realm| realm.add(account(4, "Dee", 5))).unwrap();
    realm.write(|realm| realm.remove(&live)).unwrap();

    let err = live.thaw().unwrap_err();
    assert_eq!(err.to_string(), "Invalid objects cannot be thawed.");
}

#[test]
fn frozen_realms_reject_writes() {
    let realm = Realm::temp("freeze_write", true).unwrap();
    let live = realm.write(|realm| realm.add(account(5, "Eve", 1))).unwrap();
    let frozen_realm = live.freeze().unwrap().get_realm().unwrap();

    let err = frozen_realm.write(|_| Ok(())).unwrap_err();
    assert_eq!(err.to_string(), "Can't perform transactions on a frozen Realm");
}

#[test]
fn frozen_results_keep_their_membership() {
    let realm = Realm::temp("freeze_results", true).unwrap();
    realm
        .write(|realm| {
            realm.add(account(6, "Fay", 40))?;
            realm.add(account(7, "Gus", 60))?;
            Ok(())
        })
        .unwrap();

    let frozen = realm.objects::<Account>().unwrap().freeze().unwrap();
    realm.write(|realm| realm.add(account(8, "Hal", 80)).map(|_| ())).unwrap();

    assert_eq!(frozen.len().unwrap(), 2);
    assert_eq!(realm.objects::<Account>().unwrap().len().unwrap(), 3);
}

#[test]
#[should_panic(expected = "This comparison operator is not valid inside of `where`")]
fn comparing_a_query_proxy_panics() {
    let realm = Realm::temp("freeze_proxy_eq", true).unwrap();
    let managed = realm.write(|realm| realm.add(account(10, "Jo", 0))).unwrap();
    let proxy = <Account as Object>::prepare_for_query();
    let _ = proxy == managed;
}

#[object(asymmetric)]
pub struct Reading {
    pub sensor: String,
    pub value: f64,
}

#[test]
fn asymmetric_objects_are_write_only() {
    let realm = Realm::temp("freeze_asymmetric", true).unwrap();
    realm
        .write(|realm| realm.add(Reading { sensor: "s1".to_string(), value: 0.5 }).map(|_| ()))
        .unwrap();

    let err = realm.objects::<Reading>().unwrap_err();
    assert!(matches!(err, DbError::Asymmetric));
}

#[test]
fn thread_safe_reference_resolves_on_another_session() {
    let realm = Realm::temp("freeze_tsr", true).unwrap();
    let managed = realm.write(|realm| realm.add(account(9, "Ivy", 3))).unwrap();

    let reference = ThreadSafeReference::new(&managed).unwrap();
    let handle = std::thread::spawn(move || reference);
    let reference = handle.join().unwrap();

    let resolved = reference.resolve(&realm).unwrap();
    assert_eq!(resolved.owner.get().unwrap(), "Ivy");
    assert_eq!(resolved, managed);
}
