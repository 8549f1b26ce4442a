//! SQL text generated once per container from its schema.

use super::convert::{column_type, default_literal};
use crate::error::{CoreError, CoreResult};
use crate::schema::{Schema, ID_ATTRIBUTE};

fn quote(name: &str) -> String {
    format!("\"{name}\"")
}

/// Every statement a container runs, in canonical column order.
#[derive(Debug, Clone)]
pub(crate) struct Statements {
    pub table: String,
    pub create_table: String,
    pub create_meta: String,
    pub insert: String,
    pub update: String,
    pub select: String,
    pub select_all: String,
    pub select_ids: String,
    pub exists: String,
    pub count: String,
    pub delete: String,
    pub clear: String,
    pub next_id: String,
    pub upsert_meta: String,
    pub tombstone_live: String,
    pub select_meta: String,
    pub select_meta_all: String,
}

impl Statements {
    /// Generates the statements for `schema`.
    ///
    /// # Errors
    ///
    /// Fails if an attribute kind has no column type.
    pub fn generate(schema: &Schema) -> CoreResult<Self> {
        let table = quote(schema.table());
        let meta = quote(&format!("{}_meta", schema.table()));

        let mut definitions = Vec::with_capacity(schema.len());
        for attribute in schema.attributes() {
            let column = quote(attribute.name());
            if attribute.name() == ID_ATTRIBUTE {
                definitions.push(format!("{column} INTEGER PRIMARY KEY"));
                continue;
            }
            let sql_type = column_type(attribute.kind()).ok_or_else(|| {
                CoreError::schema(format!(
                    "{}.{} is {}, which has no SQL column type",
                    schema.name(),
                    attribute.name(),
                    attribute.kind()
                ))
            })?;
            definitions.push(format!(
                "{column} {sql_type} DEFAULT {}",
                default_literal(&attribute.storage_default())
            ));
        }

        let columns: Vec<String> = schema.attributes().iter().map(|a| quote(a.name())).collect();
        let column_list = columns.join(", ");
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let assignments = schema
            .attributes()
            .iter()
            .filter(|a| a.name() != ID_ATTRIBUTE)
            .map(|a| format!("{} = :{}", quote(a.name()), a.name()))
            .collect::<Vec<_>>()
            .join(", ");
        let id = quote(ID_ATTRIBUTE);

        // a schema with only an id has nothing to update
        let update = if assignments.is_empty() {
            format!("UPDATE {table} SET {id} = :{ID_ATTRIBUTE} WHERE {id} = :{ID_ATTRIBUTE}")
        } else {
            format!("UPDATE {table} SET {assignments} WHERE {id} = :{ID_ATTRIBUTE}")
        };

        Ok(Self {
            table: schema.table().to_owned(),
            create_table: format!("CREATE TABLE IF NOT EXISTS {table} ({});", definitions.join(", ")),
            create_meta: format!(
                "CREATE TABLE IF NOT EXISTS {meta} (\"id\" INTEGER PRIMARY KEY, \"lastUpdate\" TIMESTAMP, \"deleted\" INTEGER);"
            ),
            insert: format!("INSERT INTO {table} ({column_list}) VALUES ({placeholders})"),
            update,
            select: format!("SELECT {column_list} FROM {table} WHERE {id} = ?1"),
            select_all: format!("SELECT {column_list} FROM {table} ORDER BY {id}"),
            select_ids: format!("SELECT {id} FROM {table} ORDER BY {id}"),
            exists: format!("SELECT {id} FROM {table} WHERE {id} = ?1 LIMIT 1"),
            count: format!("SELECT COUNT(*) FROM {table}"),
            delete: format!("DELETE FROM {table} WHERE {id} = ?1"),
            clear: format!("DELETE FROM {table}"),
            next_id: format!("SELECT COALESCE(MAX({id}) + 1, 0) FROM {table}"),
            upsert_meta: format!(
                "INSERT OR REPLACE INTO {meta} (\"id\", \"lastUpdate\", \"deleted\") VALUES (?1, ?2, ?3)"
            ),
            tombstone_live: format!(
                "UPDATE {meta} SET \"lastUpdate\" = ?1, \"deleted\" = 1 WHERE \"deleted\" = 0"
            ),
            select_meta: format!(
                "SELECT \"id\", \"lastUpdate\", \"deleted\" FROM {meta} WHERE \"id\" = ?1"
            ),
            select_meta_all: format!(
                "SELECT \"id\", \"lastUpdate\", \"deleted\" FROM {meta} ORDER BY \"id\""
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;

    #[test]
    fn ddl_lists_columns_in_canonical_order() {
        let schema = Schema::builder("Vote")
            .attribute(Attribute::boolean("valid", true))
            .attribute(Attribute::reference_to("vote1", "participants"))
            .attribute(Attribute::string("note", "it's"))
            .build()
            .unwrap();
        let sql = Statements::generate(&schema).unwrap();

        assert_eq!(
            sql.create_table,
            "CREATE TABLE IF NOT EXISTS \"votes\" (\"id\" INTEGER PRIMARY KEY, \
             \"note\" TEXT DEFAULT 'it''s', \"valid\" INTEGER DEFAULT 1, \
             \"vote1\" INTEGER DEFAULT -1);"
        );
        assert_eq!(
            sql.insert,
            "INSERT INTO \"votes\" (\"id\", \"note\", \"valid\", \"vote1\") VALUES (?1, ?2, ?3, ?4)"
        );
        assert_eq!(
            sql.update,
            "UPDATE \"votes\" SET \"note\" = :note, \"valid\" = :valid, \"vote1\" = :vote1 WHERE \"id\" = :id"
        );
        assert!(sql.create_meta.contains("\"votes_meta\""));
    }

    #[test]
    fn unmapped_kind_fails_generation() {
        let schema = Schema::builder("Counter")
            .attribute(Attribute::uint64("total", 0))
            .build()
            .unwrap();
        assert!(matches!(
            Statements::generate(&schema),
            Err(CoreError::Schema { .. })
        ));
    }

    #[test]
    fn existence_uses_limit_one() {
        let schema = Schema::builder("Group").build().unwrap();
        let sql = Statements::generate(&schema).unwrap();
        assert!(sql.exists.ends_with("LIMIT 1"));
        assert!(sql.next_id.contains("MAX(\"id\") + 1"));
    }
}
