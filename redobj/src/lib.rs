//! redobj reads struct annotations and derives the code necessary for persisting and querying
//! typed objects into/from [Redb](https://github.com/cberner/redb), in the manner of an
//! object database binding: declared structs get a managed counterpart whose property
//! accessors read and write the store directly, and whose comparisons double as a typed
//! query language.
//!
//! Rows are serialized with `bincode`; object notifications, frozen snapshots and
//! string-form predicates are built on top of redb's transaction model.

pub mod dictionary;
pub mod error;
pub mod list;
pub mod logger;
pub mod notifications;
pub mod obj;
pub mod persisted;
pub mod query;
pub mod rbool;
pub mod realm;
pub mod results;
pub mod schema;
pub mod set;
pub mod storage;
pub mod types;
pub mod value;

pub use chrono;
pub use dictionary::{MapBox, PersistedMap};
pub use error::DbError;
pub use inventory;
pub use list::{PersistedList, PersistedObjectList};
pub use macros::object;
pub use macros::EnumValue;
pub use macros::Object;
pub use notifications::{CollectionChange, NotificationToken, ObjectChange, PropertyChange, ResultsChange};
pub use obj::{managed_objects_equal, Obj};
pub use once_cell;
pub use persisted::{Persisted, PersistedKey, PersistedLink};
pub use rand;
pub use rbool::{CmpOp, QueryNode, Rbool};
pub use realm::{Config, Realm, ThreadSafeReference};
pub use redb;
pub use results::Results;
pub use schema::{ColKey, ManagedObject, Object, ObjectKind, ObjectSchema, Property, PropertyKind, SchemaInfo};
pub use serde;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use set::PersistedSet;
pub use types::{Datetime, Decimal128, ObjectId};
pub use uuid::Uuid;
pub use value::{PropertyValue, Row, Value};
