//! System catalog: five in-memory tables, each persisted as one file.
//!
//! Each table is a plain `Vec` of fixed-shape rows, loaded in full at open
//! and rewritten in full on every mutation — no metaclass machinery, no
//! partial updates.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::codec;
use crate::common::{oid_range, Oid, RelationKind};
use crate::error::{Error, ErrorKind, Result};

/// Built-in scalar type, seeded once and never persisted as a mutable row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinType {
    pub oid: Oid,
    pub name: &'static str,
    pub alias: &'static str,
    /// `None` means variable-length (varchar/text).
    pub bytes: Option<u32>,
    pub wire_char: char,
}

pub const TYPE_INTEGER: Oid = 2000;
pub const TYPE_BIGINT: Oid = 2001;
pub const TYPE_REAL: Oid = 2002;
pub const TYPE_DOUBLE: Oid = 2003;
pub const TYPE_BOOLEAN: Oid = 2004;
pub const TYPE_CHAR: Oid = 2005;
pub const TYPE_VARCHAR: Oid = 2006;
pub const TYPE_TEXT: Oid = 2007;

pub fn builtin_types() -> Vec<BuiltinType> {
    vec![
        BuiltinType { oid: TYPE_INTEGER, name: "integer", alias: "int", bytes: Some(4), wire_char: 'i' },
        BuiltinType { oid: TYPE_BIGINT, name: "bigint", alias: "int8", bytes: Some(8), wire_char: 'q' },
        BuiltinType { oid: TYPE_REAL, name: "real", alias: "float4", bytes: Some(4), wire_char: 'f' },
        BuiltinType { oid: TYPE_DOUBLE, name: "double", alias: "float8", bytes: Some(8), wire_char: 'd' },
        BuiltinType { oid: TYPE_BOOLEAN, name: "boolean", alias: "bool", bytes: Some(1), wire_char: 'b' },
        BuiltinType { oid: TYPE_CHAR, name: "char", alias: "character", bytes: Some(1), wire_char: 'c' },
        BuiltinType { oid: TYPE_VARCHAR, name: "varchar", alias: "character varying", bytes: None, wire_char: 's' },
        BuiltinType { oid: TYPE_TEXT, name: "text", alias: "text", bytes: None, wire_char: 't' },
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseRow {
    pub oid: Oid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRow {
    pub oid: Oid,
    pub database_oid: Oid,
    pub name: String,
    pub kind: RelationKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRow {
    pub class_oid: Oid,
    pub name: String,
    pub type_oid: Oid,
    pub length: u32,
    pub column_index: u32,
    pub notnull: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    pub index_oid: Oid,
    pub name: String,
    pub table_oid: Oid,
    pub index_column_index: u32,
    pub table_attr_index: u32,
}

fn write_str(s: &str, out: &mut Vec<u8>) {
    codec::write_u32_le(s.len() as u32, out);
    out.extend_from_slice(s.as_bytes());
}

fn read_str(buf: &[u8], offset: &mut usize) -> Result<String> {
    let len = codec::read_u32_le(codec::take(buf, *offset, 4)?) as usize;
    *offset += 4;
    let bytes = codec::take(buf, *offset, len)?;
    *offset += len;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| Error::with_message(ErrorKind::Corrupt, e.to_string()))
}

impl DatabaseRow {
    fn pack(&self) -> Vec<u8> {
        let mut out = Vec::new();
        codec::write_u64_le(self.oid, &mut out);
        write_str(&self.name, &mut out);
        out
    }

    fn unpack(buf: &[u8], offset: &mut usize) -> Result<Self> {
        let oid = codec::read_u64_le(codec::take(buf, *offset, 8)?);
        *offset += 8;
        let name = read_str(buf, offset)?;
        Ok(Self { oid, name })
    }
}

impl ClassRow {
    fn pack(&self) -> Vec<u8> {
        let mut out = Vec::new();
        codec::write_u64_le(self.oid, &mut out);
        codec::write_u64_le(self.database_oid, &mut out);
        write_str(&self.name, &mut out);
        out.push(self.kind as u8);
        out
    }

    fn unpack(buf: &[u8], offset: &mut usize) -> Result<Self> {
        let oid = codec::read_u64_le(codec::take(buf, *offset, 8)?);
        *offset += 8;
        let database_oid = codec::read_u64_le(codec::take(buf, *offset, 8)?);
        *offset += 8;
        let name = read_str(buf, offset)?;
        let kind_byte = codec::take(buf, *offset, 1)?[0];
        *offset += 1;
        let kind = RelationKind::from_u8(kind_byte)
            .ok_or_else(|| Error::with_message(ErrorKind::Corrupt, "bad relation kind byte"))?;
        Ok(Self { oid, database_oid, name, kind })
    }
}

impl AttributeRow {
    fn pack(&self) -> Vec<u8> {
        let mut out = Vec::new();
        codec::write_u64_le(self.class_oid, &mut out);
        write_str(&self.name, &mut out);
        codec::write_u64_le(self.type_oid, &mut out);
        codec::write_u32_le(self.length, &mut out);
        codec::write_u32_le(self.column_index, &mut out);
        out.push(self.notnull as u8);
        out
    }

    fn unpack(buf: &[u8], offset: &mut usize) -> Result<Self> {
        let class_oid = codec::read_u64_le(codec::take(buf, *offset, 8)?);
        *offset += 8;
        let name = read_str(buf, offset)?;
        let type_oid = codec::read_u64_le(codec::take(buf, *offset, 8)?);
        *offset += 8;
        let length = codec::read_u32_le(codec::take(buf, *offset, 4)?);
        *offset += 4;
        let column_index = codec::read_u32_le(codec::take(buf, *offset, 4)?);
        *offset += 4;
        let notnull = codec::take(buf, *offset, 1)?[0] != 0;
        *offset += 1;
        Ok(Self { class_oid, name, type_oid, length, column_index, notnull })
    }
}

impl IndexRow {
    fn pack(&self) -> Vec<u8> {
        let mut out = Vec::new();
        codec::write_u64_le(self.index_oid, &mut out);
        write_str(&self.name, &mut out);
        codec::write_u64_le(self.table_oid, &mut out);
        codec::write_u32_le(self.index_column_index, &mut out);
        codec::write_u32_le(self.table_attr_index, &mut out);
        out
    }

    fn unpack(buf: &[u8], offset: &mut usize) -> Result<Self> {
        let index_oid = codec::read_u64_le(codec::take(buf, *offset, 8)?);
        *offset += 8;
        let name = read_str(buf, offset)?;
        let table_oid = codec::read_u64_le(codec::take(buf, *offset, 8)?);
        *offset += 8;
        let index_column_index = codec::read_u32_le(codec::take(buf, *offset, 4)?);
        *offset += 4;
        let table_attr_index = codec::read_u32_le(codec::take(buf, *offset, 4)?);
        *offset += 4;
        Ok(Self { index_oid, name, table_oid, index_column_index, table_attr_index })
    }
}

fn pack_rows<T>(rows: &[T], pack_one: impl Fn(&T) -> Vec<u8>) -> Vec<u8> {
    let mut out = Vec::new();
    codec::write_u32_le(rows.len() as u32, &mut out);
    for row in rows {
        out.extend_from_slice(&pack_one(row));
    }
    out
}

fn unpack_rows<T>(buf: &[u8], unpack_one: impl Fn(&[u8], &mut usize) -> Result<T>) -> Result<Vec<T>> {
    if buf.is_empty() {
        return Ok(Vec::new());
    }
    let mut offset = 0usize;
    let count = codec::read_u32_le(codec::take(buf, offset, 4)?);
    offset += 4;
    let mut rows = Vec::with_capacity(count as usize);
    for _ in 0..count {
        rows.push(unpack_one(buf, &mut offset)?);
    }
    Ok(rows)
}

/// Which reserved OID range to allocate from. `allocate_oid` fails with a
/// DDL error when a range is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OidKind {
    SystemTable,
    Database,
    Type,
    Function,
    Relation,
}

pub struct Catalog {
    dir: PathBuf,
    pub databases: Vec<DatabaseRow>,
    pub classes: Vec<ClassRow>,
    pub attributes: Vec<AttributeRow>,
    pub indexes: Vec<IndexRow>,
    pub types: Vec<BuiltinType>,
    next_oid: HashMap<&'static str, Oid>,
}

impl Catalog {
    /// Load all catalog files under `dir/catalog`, creating them (and the
    /// built-in type rows, and the `andb` default database) if absent.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut next_oid = HashMap::new();
        next_oid.insert("system_table", oid_range::SYSTEM_TABLE_START);
        next_oid.insert("database", oid_range::DATABASE_START);
        next_oid.insert("type", oid_range::TYPE_START);
        next_oid.insert("function", oid_range::FUNCTION_START);
        next_oid.insert("relation", oid_range::RELATION_START);

        let mut catalog = Self {
            dir,
            databases: Vec::new(),
            classes: Vec::new(),
            attributes: Vec::new(),
            indexes: Vec::new(),
            types: builtin_types(),
            next_oid,
        };

        catalog.databases = catalog.load("andb_database", DatabaseRow::unpack)?;
        catalog.classes = catalog.load("andb_class", ClassRow::unpack)?;
        catalog.attributes = catalog.load("andb_attribute", AttributeRow::unpack)?;
        catalog.indexes = catalog.load("andb_index", IndexRow::unpack)?;

        if catalog.databases.is_empty() {
            catalog.databases.push(DatabaseRow {
                oid: oid_range::DATABASE_ANDB,
                name: "andb".to_string(),
            });
            catalog.next_oid.insert("database", oid_range::DATABASE_ANDB + 1);
            catalog.flush_databases()?;
        } else {
            // Re-opening an existing database: the counter above starts
            // every range back at its `_START` sentinel, which would hand
            // out an OID already claimed by a loaded row (and, for
            // relations, already naming an on-disk file) on the very next
            // `allocate_oid`. Fast-forward each range past the highest OID
            // actually on disk.
            let max_database = catalog.databases.iter().map(|d| d.oid).max().expect("non-empty checked above");
            catalog.next_oid.insert("database", max_database + 1);
        }

        let max_relation = catalog
            .classes
            .iter()
            .map(|c| c.oid)
            .chain(catalog.indexes.iter().map(|i| i.index_oid))
            .max();
        if let Some(max_relation) = max_relation {
            catalog.next_oid.insert("relation", max_relation + 1);
        }

        Ok(catalog)
    }

    fn file_path(&self, table: &str) -> PathBuf {
        self.dir.join(table)
    }

    fn load<T>(&self, table: &str, unpack_one: impl Fn(&[u8], &mut usize) -> Result<T>) -> Result<Vec<T>> {
        let path = self.file_path(table);
        match fs::read(&path) {
            Ok(bytes) => unpack_rows(&bytes, unpack_one),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::with_message(ErrorKind::IoErr, e.to_string())),
        }
    }

    fn persist(&self, table: &str, bytes: &[u8]) -> Result<()> {
        let path = self.file_path(table);
        fs::write(&path, bytes)?;
        let file = fs::File::open(&path)?;
        file.sync_all()?;
        Ok(())
    }

    fn flush_databases(&self) -> Result<()> {
        self.persist("andb_database", &pack_rows(&self.databases, DatabaseRow::pack))
    }

    fn flush_classes(&self) -> Result<()> {
        self.persist("andb_class", &pack_rows(&self.classes, ClassRow::pack))
    }

    fn flush_attributes(&self) -> Result<()> {
        self.persist("andb_attribute", &pack_rows(&self.attributes, AttributeRow::pack))
    }

    fn flush_indexes(&self) -> Result<()> {
        self.persist("andb_index", &pack_rows(&self.indexes, IndexRow::pack))
    }

    /// Hands out the next unused OID in `kind`'s range, erroring once the
    /// range is exhausted.
    pub fn allocate_oid(&mut self, kind: OidKind) -> Result<Oid> {
        let (key, end) = match kind {
            OidKind::SystemTable => ("system_table", oid_range::SYSTEM_TABLE_END),
            OidKind::Database => ("database", oid_range::DATABASE_END),
            OidKind::Type => ("type", oid_range::TYPE_END),
            OidKind::Function => ("function", oid_range::FUNCTION_END),
            OidKind::Relation => ("relation", oid_range::RELATION_END),
        };
        let next = *self.next_oid.get(key).expect("every OidKind has a counter");
        if next > end {
            return Err(Error::with_message(
                ErrorKind::Schema,
                format!("OID range for {:?} exhausted", kind),
            ));
        }
        self.next_oid.insert(key, next + 1);
        Ok(next)
    }

    pub fn find_type(&self, oid: Oid) -> Option<&BuiltinType> {
        self.types.iter().find(|t| t.oid == oid)
    }

    pub fn find_type_by_name(&self, name: &str) -> Option<&BuiltinType> {
        self.types.iter().find(|t| t.name == name || t.alias == name)
    }

    pub fn find_class_by_name(&self, database_oid: Oid, name: &str) -> Option<&ClassRow> {
        self.classes
            .iter()
            .find(|c| c.database_oid == database_oid && c.name == name)
    }

    /// Same lookup, additionally constrained by relation kind — the form the
    /// executor-facing `search()` helper of §4.E/§6 actually uses so a
    /// `DROP INDEX foo` can't accidentally resolve a heap table named `foo`.
    pub fn find_class_by_name_and_kind(&self, database_oid: Oid, name: &str, kind: RelationKind) -> Option<&ClassRow> {
        self.classes
            .iter()
            .find(|c| c.database_oid == database_oid && c.name == name && c.kind == kind)
    }

    pub fn attributes_of(&self, class_oid: Oid) -> Vec<&AttributeRow> {
        let mut rows: Vec<&AttributeRow> = self
            .attributes
            .iter()
            .filter(|a| a.class_oid == class_oid)
            .collect();
        rows.sort_by_key(|a| a.column_index);
        rows
    }

    pub fn indexes_of_table(&self, table_oid: Oid) -> Vec<&IndexRow> {
        self.indexes.iter().filter(|i| i.table_oid == table_oid).collect()
    }

    pub fn find_index_by_name(&self, name: &str) -> Option<&IndexRow> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Register a new table: allocates no OID (caller passes one already
    /// allocated via [`Catalog::allocate_oid`]) but records the class and
    /// attribute rows and persists both files.
    pub fn define_table(
        &mut self,
        oid: Oid,
        database_oid: Oid,
        name: &str,
        kind: RelationKind,
        columns: &[(String, Oid, u32, bool)],
    ) -> Result<()> {
        if self.find_class_by_name(database_oid, name).is_some() {
            return Err(Error::with_message(
                ErrorKind::Schema,
                format!("relation \"{}\" already exists", name),
            ));
        }
        self.classes.push(ClassRow {
            oid,
            database_oid,
            name: name.to_string(),
            kind,
        });
        for (index, (col_name, type_oid, length, notnull)) in columns.iter().enumerate() {
            self.attributes.push(AttributeRow {
                class_oid: oid,
                name: col_name.clone(),
                type_oid: *type_oid,
                length: *length,
                column_index: index as u32,
                notnull: *notnull,
            });
        }
        self.flush_classes()?;
        self.flush_attributes()?;
        Ok(())
    }

    /// Remove a table's class and attribute rows. Caller is responsible for
    /// checking index dependencies and for the underlying file/buffer work.
    pub fn undefine_table(&mut self, oid: Oid) -> Result<()> {
        self.classes.retain(|c| c.oid != oid);
        self.attributes.retain(|a| a.class_oid != oid);
        self.flush_classes()?;
        self.flush_attributes()?;
        Ok(())
    }

    pub fn define_index(&mut self, row: IndexRow) -> Result<()> {
        self.indexes.push(row);
        self.flush_indexes()
    }

    pub fn undefine_index(&mut self, index_oid: Oid) -> Result<()> {
        self.indexes.retain(|i| i.index_oid != index_oid);
        self.flush_indexes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_seeds_default_database_and_builtin_types() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::open(dir.path().join("catalog")).unwrap();
        assert_eq!(catalog.databases.len(), 1);
        assert_eq!(catalog.databases[0].name, "andb");
        assert_eq!(catalog.types.len(), 8);
        assert!(catalog.find_type(TYPE_TEXT).is_some());
    }

    #[test]
    fn define_table_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog");
        let mut catalog = Catalog::open(&path).unwrap();
        let oid = catalog.allocate_oid(OidKind::Relation).unwrap();
        catalog
            .define_table(
                oid,
                oid_range::DATABASE_ANDB,
                "widgets",
                RelationKind::Heap,
                &[("id".to_string(), TYPE_INTEGER, 4, true)],
            )
            .unwrap();

        let reopened = Catalog::open(&path).unwrap();
        let class = reopened
            .find_class_by_name(oid_range::DATABASE_ANDB, "widgets")
            .unwrap();
        assert_eq!(class.oid, oid);
        assert_eq!(reopened.attributes_of(oid).len(), 1);
    }

    #[test]
    fn reopen_advances_the_relation_oid_counter_past_loaded_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog");
        let mut catalog = Catalog::open(&path).unwrap();
        let oid = catalog.allocate_oid(OidKind::Relation).unwrap();
        catalog
            .define_table(
                oid,
                oid_range::DATABASE_ANDB,
                "widgets",
                RelationKind::Heap,
                &[("id".to_string(), TYPE_INTEGER, 4, true)],
            )
            .unwrap();

        let mut reopened = Catalog::open(&path).unwrap();
        let next = reopened.allocate_oid(OidKind::Relation).unwrap();
        assert!(next > oid, "reopen must not hand back an OID already claimed by a loaded relation");
        assert_eq!(next, oid + 1);
    }

    #[test]
    fn duplicate_table_name_is_rejected() {
        let dir = tempdir().unwrap();
        let mut catalog = Catalog::open(dir.path().join("catalog")).unwrap();
        let oid = catalog.allocate_oid(OidKind::Relation).unwrap();
        catalog
            .define_table(oid, oid_range::DATABASE_ANDB, "t", RelationKind::Heap, &[])
            .unwrap();
        let oid2 = catalog.allocate_oid(OidKind::Relation).unwrap();
        let err = catalog
            .define_table(oid2, oid_range::DATABASE_ANDB, "t", RelationKind::Heap, &[])
            .unwrap_err();
        assert_eq!(err.code, ErrorKind::Schema);
    }

    #[test]
    fn allocate_oid_exhaustion_is_a_ddl_error() {
        let dir = tempdir().unwrap();
        let mut catalog = Catalog::open(dir.path().join("catalog")).unwrap();
        catalog.next_oid.insert("type", oid_range::TYPE_END + 1);
        let err = catalog.allocate_oid(OidKind::Type).unwrap_err();
        assert_eq!(err.severity(), crate::error::Severity::Ddl);
    }
}
