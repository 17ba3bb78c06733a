use crate::error::DbError;
use crate::obj::Obj;
use crate::realm::Realm;

/// Storage kind of a single property.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PropertyKind {
    Int,
    Bool,
    Double,
    String,
    Binary,
    Timestamp,
    Uuid,
    ObjectId,
    Decimal,
    /// Link column; the target must be another registered object type.
    Object { target: &'static str },
    List(&'static PropertyKind),
    Set(&'static PropertyKind),
    Dictionary(&'static PropertyKind),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    TopLevel,
    Embedded,
    Asymmetric,
}

#[derive(Copy, Clone, Debug)]
pub struct Property {
    pub name: &'static str,
    pub kind: PropertyKind,
    pub nullable: bool,
    pub primary_key: bool,
}

/// Opaque handle identifying a property's physical column within a table.
/// Resolved once per property per binding and cached in the accessor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ColKey(pub(crate) u16);

impl ColKey {
    /// Construction from a property ordinal; meant for generated code, where
    /// the ordinal is known from the schema declaration.
    #[doc(hidden)]
    pub const fn from_ordinal(ordinal: u16) -> ColKey {
        ColKey(ordinal)
    }

    pub(crate) fn ix(&self) -> usize {
        self.0 as usize
    }
}

/// Compile-time descriptor of one object type: ordered property list plus the
/// table classifier. Property order matches declaration order.
#[derive(Copy, Clone, Debug)]
pub struct ObjectSchema {
    pub name: &'static str,
    pub kind: ObjectKind,
    pub properties: &'static [Property],
}

impl ObjectSchema {
    pub fn col_key(&self, name: &str) -> Option<ColKey> {
        self.properties.iter().position(|p| p.name == name).map(|ix| ColKey(ix as u16))
    }

    pub fn property(&self, col: ColKey) -> Option<&'static Property> {
        self.properties.get(col.ix())
    }

    pub fn primary_key(&self) -> Option<(ColKey, &'static Property)> {
        self.properties
            .iter()
            .position(|p| p.primary_key)
            .map(|ix| (ColKey(ix as u16), &self.properties[ix]))
    }
}

/// One schema type, as declared by a user struct. Implemented by
/// `#[derive(Object)]`; `insert` persists the object graph (embedded and
/// linked children first) and is the write half of the unmanaged/managed
/// translation, `detach` on the managed wrapper being the read half.
pub trait Object: Sized + 'static {
    const KIND: ObjectKind;
    type Managed: ManagedObject<Plain = Self>;

    fn schema() -> &'static ObjectSchema;
    /// Creates the backing row (and rows for the object graph below it).
    fn insert(self, realm: &Realm) -> Result<Obj, DbError>;
    /// Binds fresh accessors to a persisted row, resolving each column key once.
    fn bind(obj: Obj) -> Self::Managed;
    /// Builds a proxy whose accessors are in query-capture mode.
    fn prepare_for_query() -> Self::Managed;
}

/// Implemented by every generated managed wrapper. `object_handle` is `None`
/// for query-capture proxies, which back no physical row.
pub trait ManagedObject {
    type Plain: Object;

    fn object_handle(&self) -> Option<&Obj>;
}

/// Process-wide registration of one schema type, submitted via `inventory`
/// by the derive macro and collected when a realm is opened.
pub struct SchemaInfo {
    pub schema: fn() -> &'static ObjectSchema,
}

inventory::collect!(SchemaInfo);

#[cfg(test)]
mod tests {
    use super::*;

    static PROPS: [Property; 2] = [
        Property { name: "_id", kind: PropertyKind::Int, nullable: false, primary_key: true },
        Property { name: "name", kind: PropertyKind::String, nullable: false, primary_key: false },
    ];
    static SCHEMA: ObjectSchema = ObjectSchema { name: "Person", kind: ObjectKind::TopLevel, properties: &PROPS };

    #[test]
    fn column_keys_follow_declaration_order() {
        assert_eq!(SCHEMA.col_key("_id"), Some(ColKey(0)));
        assert_eq!(SCHEMA.col_key("name"), Some(ColKey(1)));
        assert_eq!(SCHEMA.col_key("missing"), None);
    }

    #[test]
    fn primary_key_lookup() {
        let (col, prop) = SCHEMA.primary_key().unwrap();
        assert_eq!(col, ColKey(0));
        assert_eq!(prop.name, "_id");
    }
}
