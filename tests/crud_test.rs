use redobj::*;
use std::collections::{BTreeMap, BTreeSet};

#[object]
pub struct Dog {
    pub name: String,
    pub age: i64,
}

#[object(embedded)]
pub struct Address {
    pub street: String,
    pub city: String,
}

#[object]
pub struct Person {
    #[pk]
    pub _id: i64,
    pub name: String,
    pub age: i64,
    pub nickname: Option<String>,
    pub dog: Option<Dog>,
    pub tags: Vec<String>,
    pub scores: BTreeSet<i64>,
    pub attributes: BTreeMap<String, String>,
    pub address: Option<Address>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, EnumValue)]
pub enum Tier {
    #[default]
    Bronze,
    Silver,
    Gold,
}

#[object]
pub struct Profile {
    #[pk]
    pub _id: i64,
    pub ticket: Uuid,
    pub label: String,
    pub count: i64,
    pub ratio: f64,
    pub active: bool,
    pub avatar: Vec<u8>,
    pub created: Datetime,
    pub session: ObjectId,
    pub balance: Decimal128,
    pub tier: Tier,
}

fn sample_person() -> Person {
    Person {
        _id: 123,
        name: "John".to_string(),
        age: 30,
        nickname: Some("Johnny".to_string()),
        dog: Some(Dog { name: "Rex".to_string(), age: 3 }),
        tags: vec!["vip".to_string(), "staff".to_string()],
        scores: BTreeSet::from([7, 11]),
        attributes: BTreeMap::from([("tier".to_string(), "gold".to_string())]),
        address: Some(Address { street: "Elm St".to_string(), city: "Springfield".to_string() }),
    }
}

#[test]
fn add_read_and_detach_round_trip() {
    let realm = Realm::temp("crud_round_trip", true).unwrap();
    let managed = realm.write(|realm| realm.add(sample_person())).unwrap();

    assert_eq!(managed._id.get().unwrap(), 123);
    assert_eq!(managed.name.get().unwrap(), "John");
    assert_eq!(managed.nickname.get().unwrap(), Some("Johnny".to_string()));
    assert_eq!(managed.dog.get().unwrap().unwrap().name.get().unwrap(), "Rex");
    assert_eq!(managed.tags.size().unwrap(), 2);
    assert_eq!(managed.address.get().unwrap().unwrap().city.get().unwrap(), "Springfield");

    let detached = managed.detach().unwrap();
    assert_eq!(detached, sample_person());
}

#[test]
fn set_requires_a_write_transaction() {
    let realm = Realm::temp("crud_txn_guard", true).unwrap();
    let mut managed = realm.write(|realm| realm.add(sample_person())).unwrap();

    let err = managed.age.set(31).unwrap_err();
    assert_eq!(err.to_string(), "Trying to modify database while in read transaction");

    realm
        .write(|_| {
            managed.age.set(31)?;
            managed.age.add_assign(4)?;
            managed.nickname.set(None)
        })
        .unwrap();
    assert_eq!(managed.age.get().unwrap(), 35);
    assert_eq!(managed.nickname.get().unwrap(), None);
}

#[test]
fn duplicate_primary_keys_are_rejected() {
    let realm = Realm::temp("crud_duplicate_pk", true).unwrap();
    realm.write(|realm| realm.add(sample_person())).unwrap();
    let err = realm.write(|realm| realm.add(sample_person())).unwrap_err();
    assert!(matches!(err, DbError::DuplicatePrimaryKey("Person")));
    assert_eq!(realm.objects::<Person>().unwrap().len().unwrap(), 1);
}

#[test]
fn remove_invalidates_the_managed_object() {
    let realm = Realm::temp("crud_remove", true).unwrap();
    let managed = realm.write(|realm| realm.add(sample_person())).unwrap();
    assert!(!managed.is_invalidated());

    realm.write(|realm| realm.remove(&managed)).unwrap();
    assert!(managed.is_invalidated());
    assert!(matches!(managed.name.get(), Err(DbError::InvalidatedObject)));
    assert_eq!(realm.objects::<Person>().unwrap().len().unwrap(), 0);
}

#[test]
fn failed_write_rolls_back() {
    let realm = Realm::temp("crud_rollback", true).unwrap();
    let err = realm
        .write(|realm| {
            realm.add(sample_person())?;
            Err::<(), _>(DbError::Custom("boom".into()))
        })
        .unwrap_err();
    assert!(matches!(err, DbError::Custom(_)));
    assert_eq!(realm.objects::<Person>().unwrap().len().unwrap(), 0);
}

#[test]
fn replacing_an_embedded_link_deletes_the_old_child() {
    let realm = Realm::temp("crud_embedded", true).unwrap();
    let mut managed = realm.write(|realm| realm.add(sample_person())).unwrap();

    realm
        .write(|_| {
            managed
                .address
                .set(Some(Address { street: "Oak Ave".to_string(), city: "Shelbyville".to_string() }))
        })
        .unwrap();
    assert_eq!(managed.address.get().unwrap().unwrap().street.get().unwrap(), "Oak Ave");

    realm.write(|_| managed.address.set(None)).unwrap();
    assert_eq!(managed.address.get().unwrap(), None);
}

fn sample_profile() -> Profile {
    Profile {
        _id: 7,
        ticket: Uuid::new_v4(),
        label: "base".to_string(),
        count: -42,
        ratio: 2.5,
        active: true,
        avatar: vec![0, 1, 254, 255],
        created: Datetime::from_timestamp(1_700_000_000, 123_456_789),
        session: ObjectId::generate(),
        balance: "19.99".parse().unwrap(),
        tier: Tier::Gold,
    }
}

#[test]
fn every_scalar_category_round_trips() {
    let realm = Realm::temp("crud_scalars", true).unwrap();
    let profile = sample_profile();
    let managed = realm.write(|realm| realm.add(profile.clone())).unwrap();

    assert_eq!(managed.ticket.get().unwrap(), profile.ticket);
    assert_eq!(managed.ratio.get().unwrap(), 2.5);
    assert!(managed.active.get().unwrap());
    assert_eq!(managed.avatar.get().unwrap(), vec![0, 1, 254, 255]);
    assert_eq!(managed.created.get().unwrap(), profile.created);
    assert_eq!(managed.session.get().unwrap(), profile.session);
    assert_eq!(managed.balance.get().unwrap(), "19.99".parse().unwrap());
    assert_eq!(managed.tier.get().unwrap(), Tier::Gold);

    assert_eq!(managed.detach().unwrap(), profile);
}

#[test]
fn detach_is_repeatable() {
    let realm = Realm::temp("crud_detach_twice", true).unwrap();
    let profile = sample_profile();
    let managed = realm.write(|realm| realm.add(profile.clone())).unwrap();
    let first = managed.detach().unwrap();
    let second = managed.detach().unwrap();
    assert_eq!(first, profile);
    assert_eq!(second, first);
}

#[test]
fn managed_handles_format_with_their_table_and_key() {
    let realm = Realm::temp("crud_debug", true).unwrap();
    let managed = realm.write(|realm| realm.add(sample_profile())).unwrap();
    let rendered = format!("{:?}", managed.count);
    assert!(rendered.contains("Profile"), "unexpected debug output: {}", rendered);
}

#[test]
fn managed_display_renders_json() {
    let realm = Realm::temp("crud_display", true).unwrap();
    let managed = realm.write(|realm| realm.add(sample_person())).unwrap();
    let rendered: serde_json::Value = serde_json::from_str(&managed.to_string()).unwrap();
    assert_eq!(rendered["name"], serde_json::json!("John"));
    assert_eq!(rendered["age"], serde_json::json!(30));
}
