#![allow(warnings)]

use redobj::*;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, EnumValue)]
pub enum Color {
    #[default]
    Red,
    Green,
    Blue,
}

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

#[object(asymmetric)]
pub struct Measurement {
    pub value: f64,
    pub taken_at: Datetime,
}

#[object]
pub struct Person {
    #[pk]
    pub _id: i64,
    pub name: String,
    pub age: i64,
    pub weight: f64,
    pub alive: bool,
    pub data: Vec<u8>,
    pub born: Datetime,
    pub ticket: Uuid,
    pub oid: ObjectId,
    pub balance: Decimal128,
    pub nickname: Option<String>,
    pub color: Color,
    pub dog: Option<Dog>,
    pub dogs: Vec<Dog>,
    pub tags: Vec<String>,
    pub scores: BTreeSet<i64>,
    pub attributes: BTreeMap<String, String>,
    pub address: Option<Address>,
}

fn main() {
    let _ = Dog { name: "Rex".to_string(), age: 3 };
    let _ = Address::default();
    let _ = Measurement { value: 21.5, taken_at: Datetime::now() };
    let person = Person {
        _id: 1,
        name: "Joe".to_string(),
        color: Color::Blue,
        dog: Some(Dog { name: "Fido".to_string(), age: 2 }),
        tags: vec!["vip".to_string()],
        ..Person::default()
    };
    let _ = person;
}
