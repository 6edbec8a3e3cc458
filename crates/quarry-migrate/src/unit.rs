use sha2::{Digest, Sha256};

/// One versioned, immutable schema change: an ordered set of DDL operations
/// plus an author tag. Units are defined as static data and must never be
/// edited once they have been applied anywhere; the checksum is computed over
/// the rendered SQL, so any edit shows up as a mismatch against the ledger.
#[derive(Debug, Clone)]
pub struct MigrationUnit {
    pub id: String,
    pub author: String,
    pub description: String,
    pub operations: Vec<SchemaOp>,
}

impl MigrationUnit {
    pub fn new(
        id: impl Into<String>,
        author: impl Into<String>,
        description: impl Into<String>,
        operations: Vec<SchemaOp>,
    ) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            description: description.into(),
            operations,
        }
    }

    /// Render every operation to its SQL statement, in definition order.
    pub fn render_sql(&self) -> Vec<String> {
        self.operations.iter().map(SchemaOp::to_sql).collect()
    }

    /// Lowercase-hex SHA-256 over the rendered SQL. The rendered form is the
    /// canonical serialization, so reordering or editing any operation
    /// changes the checksum.
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        for sql in self.render_sql() {
            hasher.update(sql.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}

/// A single schema operation within a migration unit.
#[derive(Debug, Clone)]
pub enum SchemaOp {
    CreateTable {
        table: String,
        columns: Vec<ColumnDef>,
    },
    AddColumn {
        table: String,
        column: ColumnDef,
    },
    CreateIndex {
        name: String,
        table: String,
        columns: Vec<String>,
        unique: bool,
    },
    DropTable {
        table: String,
    },
}

impl SchemaOp {
    pub fn to_sql(&self) -> String {
        match self {
            SchemaOp::CreateTable { table, columns } => {
                let cols: Vec<String> = columns.iter().map(ColumnDef::to_sql).collect();
                format!("CREATE TABLE {} ({})", table, cols.join(", "))
            }
            SchemaOp::AddColumn { table, column } => {
                format!("ALTER TABLE {} ADD COLUMN {}", table, column.to_sql())
            }
            SchemaOp::CreateIndex {
                name,
                table,
                columns,
                unique,
            } => {
                let kind = if *unique { "UNIQUE INDEX" } else { "INDEX" };
                format!("CREATE {} {} ON {}({})", kind, name, table, columns.join(", "))
            }
            SchemaOp::DropTable { table } => format!("DROP TABLE {}", table),
        }
    }
}

/// SQLite storage class for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Text,
    Real,
    Boolean,
    Timestamp,
}

impl ColumnType {
    fn sql(self) -> &'static str {
        match self {
            // Booleans are 0/1 integers and timestamps are TEXT in SQLite's
            // datetime('now') format.
            ColumnType::Integer | ColumnType::Boolean => "INTEGER",
            ColumnType::Text | ColumnType::Timestamp => "TEXT",
            ColumnType::Real => "REAL",
        }
    }
}

/// A typed column definition: name, storage type, and constraints.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
    pub nullable: bool,
    pub unique: bool,
    pub primary_key: bool,
    pub default: Option<String>,
    pub references: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            unique: false,
            primary_key: false,
            default: None,
            references: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Raw SQL default expression, e.g. `1` or `(datetime('now'))`.
    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Foreign key target in `table(column)` form.
    pub fn references(mut self, target: impl Into<String>) -> Self {
        self.references = Some(target.into());
        self
    }

    fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.ty.sql());
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
            if self.ty == ColumnType::Integer {
                sql.push_str(" AUTOINCREMENT");
            }
        } else if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if self.unique && !self.primary_key {
            sql.push_str(" UNIQUE");
        }
        if let Some(default) = &self.default {
            sql.push_str(&format!(" DEFAULT {default}"));
        }
        if let Some(target) = &self.references {
            sql.push_str(&format!(" REFERENCES {target}"));
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_unit() -> MigrationUnit {
        MigrationUnit::new(
            "001-create-users",
            "tester",
            "create the users table",
            vec![SchemaOp::CreateTable {
                table: "users".into(),
                columns: vec![
                    ColumnDef::new("id", ColumnType::Integer).primary_key(),
                    ColumnDef::new("username", ColumnType::Text).not_null().unique(),
                    ColumnDef::new("is_active", ColumnType::Boolean)
                        .not_null()
                        .default_expr("1"),
                ],
            }],
        )
    }

    #[test]
    fn create_table_renders_columns_in_order() {
        let sql = users_unit().render_sql();
        assert_eq!(sql.len(), 1);
        assert_eq!(
            sql[0],
            "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, \
             username TEXT NOT NULL UNIQUE, is_active INTEGER NOT NULL DEFAULT 1)"
        );
    }

    #[test]
    fn add_column_and_index_render() {
        let add = SchemaOp::AddColumn {
            table: "users".into(),
            column: ColumnDef::new("last_login_at", ColumnType::Timestamp),
        };
        assert_eq!(add.to_sql(), "ALTER TABLE users ADD COLUMN last_login_at TEXT");

        let idx = SchemaOp::CreateIndex {
            name: "idx_users_email".into(),
            table: "users".into(),
            columns: vec!["email".into()],
            unique: true,
        };
        assert_eq!(idx.to_sql(), "CREATE UNIQUE INDEX idx_users_email ON users(email)");
    }

    #[test]
    fn foreign_key_column_renders_reference() {
        let col = ColumnDef::new("user_id", ColumnType::Integer)
            .not_null()
            .references("users(id)");
        let op = SchemaOp::CreateTable {
            table: "audit".into(),
            columns: vec![col],
        };
        assert_eq!(
            op.to_sql(),
            "CREATE TABLE audit (user_id INTEGER NOT NULL REFERENCES users(id))"
        );
    }

    #[test]
    fn checksum_is_stable_for_identical_content() {
        assert_eq!(users_unit().checksum(), users_unit().checksum());
    }

    #[test]
    fn checksum_changes_when_an_operation_changes() {
        let original = users_unit();
        let mut edited = users_unit();
        if let SchemaOp::CreateTable { columns, .. } = &mut edited.operations[0] {
            columns.push(ColumnDef::new("email", ColumnType::Text));
        }
        assert_ne!(original.checksum(), edited.checksum());
    }

    #[test]
    fn checksum_ignores_informational_fields() {
        let mut renamed = users_unit();
        renamed.author = "someone-else".into();
        renamed.description = "different words".into();
        assert_eq!(users_unit().checksum(), renamed.checksum());
    }
}
