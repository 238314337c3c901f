use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use homestead_types::models::{Address, Role};

use super::{now_ts, ts_col, uuid_col};
use crate::models::{NewUser, ProfileUpdate, UserRow};
use crate::{Database, Result, StoreError};

const USER_COLUMNS: &str = "id, name, email, password, phone_number, city, street, profile_image, role, active, created_at, updated_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, new: &NewUser) -> Result<UserRow> {
        self.with_conn(|conn| {
            if query_user(conn, "email", &new.email)?.is_some() {
                return Err(StoreError::Conflict("user already exists".into()));
            }

            let id = Uuid::new_v4();
            let (_, now) = now_ts();
            conn.execute(
                "INSERT INTO users (id, name, email, password, phone_number, city, street, role, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                rusqlite::params![
                    id.to_string(),
                    new.name,
                    new.email,
                    new.password_hash,
                    new.phone_number,
                    new.address.city,
                    new.address.street,
                    new.role.as_str(),
                    now,
                ],
            )?;

            query_user(conn, "id", &id.to_string())?.ok_or(StoreError::NotFound("user"))
        })
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn set_user_role(&self, id: Uuid, role: Role) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET role = ?2 WHERE id = ?1",
                rusqlite::params![id.to_string(), role.as_str()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("user"));
            }
            Ok(())
        })
    }

    /// Apply a profile edit. Returns the updated row and the previous profile
    /// image path when it was replaced.
    pub fn update_profile(
        &self,
        id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<(UserRow, Option<String>)> {
        self.with_conn(|conn| {
            let current =
                query_user(conn, "id", &id.to_string())?.ok_or(StoreError::NotFound("user"))?;

            let (_, now) = now_ts();
            conn.execute(
                "UPDATE users SET
                    name = COALESCE(?2, name),
                    phone_number = COALESCE(?3, phone_number),
                    city = COALESCE(?4, city),
                    street = COALESCE(?5, street),
                    profile_image = COALESCE(?6, profile_image),
                    updated_at = ?7
                 WHERE id = ?1",
                rusqlite::params![
                    id.to_string(),
                    update.name,
                    update.phone_number,
                    update.city,
                    update.street,
                    update.profile_image,
                    now,
                ],
            )?;

            let updated =
                query_user(conn, "id", &id.to_string())?.ok_or(StoreError::NotFound("user"))?;
            let replaced = match (&update.profile_image, current.profile_image) {
                (Some(_), Some(old)) => Some(old),
                _ => None,
            };
            Ok((updated, replaced))
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is always one of our literals, never caller input.
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
    let mut stmt = conn.prepare_cached(&sql)?;
    let row = stmt.query_row([value], user_from_row).optional()?;
    Ok(row)
}

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    let role: String = row.get(8)?;
    Ok(UserRow {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        phone_number: row.get(4)?,
        address: Address {
            city: row.get(5)?,
            street: row.get(6)?,
        },
        profile_image: row.get(7)?,
        role: role.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, e.into())
        })?,
        active: row.get(9)?,
        created_at: ts_col(row, 10)?,
        updated_at: ts_col(row, 11)?,
    })
}
