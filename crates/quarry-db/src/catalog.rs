use quarry_migrate::{ColumnDef, ColumnType, MigrationUnit, SchemaOp};

/// The ordered list of built-in migration units for the user schema.
///
/// These are shipped history: once a unit has been applied anywhere its
/// content is frozen. A schema fix means appending a new unit, never editing
/// one of these.
pub fn units() -> Vec<MigrationUnit> {
    vec![
        MigrationUnit::new(
            "001-create-users-table",
            "quarry",
            "create the users table",
            vec![SchemaOp::CreateTable {
                table: "users".into(),
                columns: vec![
                    ColumnDef::new("id", ColumnType::Integer).primary_key(),
                    ColumnDef::new("username", ColumnType::Text).not_null(),
                    ColumnDef::new("email", ColumnType::Text).not_null(),
                    ColumnDef::new("password", ColumnType::Text),
                    ColumnDef::new("first_name", ColumnType::Text),
                    ColumnDef::new("last_name", ColumnType::Text),
                    ColumnDef::new("is_active", ColumnType::Boolean)
                        .not_null()
                        .default_expr("1"),
                    ColumnDef::new("created_at", ColumnType::Timestamp)
                        .not_null()
                        .default_expr("(datetime('now'))"),
                    ColumnDef::new("updated_at", ColumnType::Timestamp)
                        .not_null()
                        .default_expr("(datetime('now'))"),
                ],
            }],
        ),
        MigrationUnit::new(
            "002-users-unique-keys",
            "quarry",
            "enforce username and email uniqueness at the storage layer",
            vec![
                SchemaOp::CreateIndex {
                    name: "idx_users_username".into(),
                    table: "users".into(),
                    columns: vec!["username".into()],
                    unique: true,
                },
                SchemaOp::CreateIndex {
                    name: "idx_users_email".into(),
                    table: "users".into(),
                    columns: vec!["email".into()],
                    unique: true,
                },
            ],
        ),
        MigrationUnit::new(
            "003-index-active-users",
            "quarry",
            "index is_active for listing filters",
            vec![SchemaOp::CreateIndex {
                name: "idx_users_active".into(),
                table: "users".into(),
                columns: vec!["is_active".into()],
                unique: false,
            }],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::units;

    #[test]
    fn unit_ids_are_unique_and_sorted() {
        let units = units();
        let mut ids: Vec<&str> = units.iter().map(|u| u.id.as_str()).collect();
        let original = ids.clone();
        ids.sort();
        ids.dedup();
        assert_eq!(ids, original);
    }

    #[test]
    fn catalog_checksums_are_stable_across_calls() {
        let first: Vec<String> = units().iter().map(|u| u.checksum()).collect();
        let second: Vec<String> = units().iter().map(|u| u.checksum()).collect();
        assert_eq!(first, second);
        for checksum in first {
            assert_eq!(checksum.len(), 64);
            assert!(checksum.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }
}
