use redobj::*;

#[object]
pub struct Employee {
    #[pk]
    pub _id: i64,
    pub name: String,
    pub age: i64,
    pub salary: f64,
    pub team: Option<String>,
}

fn seed(realm: &Realm) {
    realm
        .write(|realm| {
            realm.add(Employee {
                _id: 123,
                name: "John".to_string(),
                age: 30,
                salary: 100.0,
                team: Some("core".to_string()),
            })?;
            realm.add(Employee {
                _id: 7,
                name: "Jane".to_string(),
                age: 41,
                salary: 140.5,
                team: None,
            })?;
            realm.add(Employee {
                _id: 9,
                name: "Joe".to_string(),
                age: 17,
                salary: 20.0,
                team: Some("intern".to_string()),
            })?;
            Ok(())
        })
        .unwrap();
}

#[test]
fn conjunction_with_contradicting_terms_matches_nothing() {
    let realm = Realm::temp("query_and", true).unwrap();
    seed(&realm);
    let results = realm
        .objects::<Employee>()
        .unwrap()
        .filter(|e| e._id.eq(123) & e.name.ne("John"))
        .unwrap();
    assert_eq!(results.len().unwrap(), 0);
}

#[test]
fn disjunction_of_the_same_terms_matches_one() {
    let realm = Realm::temp("query_or", true).unwrap();
    seed(&realm);
    let results = realm
        .objects::<Employee>()
        .unwrap()
        .filter(|e| e._id.eq(123) | e.name.ne("John"))
        .unwrap();
    assert_eq!(results.len().unwrap(), 3);
    let narrowed = realm
        .objects::<Employee>()
        .unwrap()
        .filter(|e| e._id.eq(123) | e.name.eq("John"))
        .unwrap();
    assert_eq!(narrowed.len().unwrap(), 1);
}

#[test]
fn string_form_matches_the_typed_form() {
    let realm = Realm::temp("query_equivalence", true).unwrap();
    seed(&realm);
    let objects = realm.objects::<Employee>().unwrap();

    let typed = objects.filter(|e| e._id.eq(123) & e.name.ne("John")).unwrap();
    let parsed = objects
        .filter_str("_id == $0 && name != $1", &[Value::Int(123), Value::String("John".into())])
        .unwrap();
    assert_eq!(typed.len().unwrap(), parsed.len().unwrap());

    let typed = objects.filter(|e| e.age.gt(18) & e.name.contains("J")).unwrap();
    let parsed = objects.filter_str("age > 18 && name CONTAINS 'J'", &[]).unwrap();
    assert_eq!(typed.len().unwrap(), 2);
    assert_eq!(parsed.len().unwrap(), 2);
}

#[test]
fn negation_null_checks_and_builtin_predicates() {
    let realm = Realm::temp("query_null", true).unwrap();
    seed(&realm);
    let objects = realm.objects::<Employee>().unwrap();

    assert_eq!(objects.filter(|e| !e.age.lt(18)).unwrap().len().unwrap(), 2);
    assert_eq!(objects.filter(|e| e.team.eq(None)).unwrap().len().unwrap(), 1);
    assert_eq!(objects.filter_str("team == NULL", &[]).unwrap().len().unwrap(), 1);
    assert_eq!(objects.filter_str("TRUEPREDICATE", &[]).unwrap().len().unwrap(), 3);
    assert_eq!(objects.filter_str("FALSEPREDICATE", &[]).unwrap().len().unwrap(), 0);
    assert_eq!(objects.filter(|_| Rbool::all()).unwrap().len().unwrap(), 3);
}

#[test]
fn mixing_concrete_and_captured_booleans_is_rejected() {
    let realm = Realm::temp("query_mixing", true).unwrap();
    seed(&realm);
    let err = realm
        .objects::<Employee>()
        .unwrap()
        .filter(|e| e.age.gt(18) & Rbool::from(true))
        .unwrap_err();
    assert!(matches!(err, DbError::QueryMisuse(_)));
}

#[test]
fn sort_and_index_access() {
    let realm = Realm::temp("query_sort", true).unwrap();
    seed(&realm);
    let by_age = realm.objects::<Employee>().unwrap().sort("age", true).unwrap();
    assert_eq!(by_age.get(0).unwrap().name.get().unwrap(), "Joe");
    assert_eq!(by_age.get(2).unwrap().name.get().unwrap(), "Jane");

    let descending = realm.objects::<Employee>().unwrap().sort("salary", false).unwrap();
    assert_eq!(descending.get(0).unwrap().name.get().unwrap(), "Jane");

    let err = by_age.get(3).unwrap_err();
    assert!(matches!(err, DbError::OutOfBounds { index: 3, size: 3 }));

    let names: Vec<String> = by_age.iter().unwrap().map(|e| e.name.get().unwrap()).collect();
    assert_eq!(names, vec!["Joe", "John", "Jane"]);
}

#[test]
fn malformed_queries_report_errors() {
    let realm = Realm::temp("query_malformed", true).unwrap();
    seed(&realm);
    let objects = realm.objects::<Employee>().unwrap();
    assert!(matches!(objects.filter_str("height > 3", &[]), Err(DbError::InvalidQuery(_))));
    assert!(matches!(objects.filter_str("age >", &[]), Err(DbError::InvalidQuery(_))));
    assert!(matches!(objects.filter_str("age > $0", &[]), Err(DbError::InvalidQuery(_))));
}
