use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use super::products::{PRODUCT_COLUMN_COUNT, PRODUCT_COLUMNS, product_from_row, query_product};
use super::{now_ts, ts_col, uuid_col};
use crate::models::WishlistRow;
use crate::{Database, Result, StoreError};

impl Database {
    // -- Wishlist --

    /// Add a (user, product) pair. Pairs are unique: re-adding is a `Conflict`.
    pub fn add_to_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<WishlistRow> {
        self.with_conn(|conn| {
            let product = query_product(conn, product_id)?.ok_or(StoreError::NotFound("product"))?;
            if wishlist_entry_exists(conn, user_id, product_id)? {
                return Err(StoreError::Conflict("product already in wishlist".into()));
            }

            let (added_at, now) = now_ts();
            conn.execute(
                "INSERT INTO wishlist (user_id, product_id, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![user_id.to_string(), product_id.to_string(), now],
            )?;
            Ok(WishlistRow { product, added_at })
        })
    }

    /// Remove a pair and return the user's remaining wishlist product ids.
    pub fn remove_from_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM wishlist WHERE user_id = ?1 AND product_id = ?2",
                rusqlite::params![user_id.to_string(), product_id.to_string()],
            )?;
            if removed == 0 {
                return Err(StoreError::NotFound("wishlist entry"));
            }
            query_wishlist_ids(conn, user_id)
        })
    }

    /// Wishlist entries with product details, newest first.
    pub fn list_wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {}, w.created_at
                 FROM wishlist w
                 JOIN products p ON p.id = w.product_id
                 WHERE w.user_id = ?1
                 ORDER BY w.created_at DESC, p.id",
                PRODUCT_COLUMNS
            );
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok(WishlistRow {
                        product: product_from_row(row, 0)?,
                        added_at: ts_col(row, PRODUCT_COLUMN_COUNT)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn wishlist_product_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| query_wishlist_ids(conn, user_id))
    }
}

fn wishlist_entry_exists(conn: &Connection, user_id: Uuid, product_id: Uuid) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM wishlist WHERE user_id = ?1 AND product_id = ?2",
            rusqlite::params![user_id.to_string(), product_id.to_string()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn query_wishlist_ids(conn: &Connection, user_id: Uuid) -> Result<Vec<Uuid>> {
    let mut stmt = conn.prepare_cached(
        "SELECT product_id FROM wishlist WHERE user_id = ?1 ORDER BY created_at, product_id",
    )?;
    let ids = stmt
        .query_map([user_id.to_string()], |row| uuid_col(row, 0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{new_product, new_user};

    #[test]
    fn pairs_are_unique() {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user(&new_user("Ann")).unwrap();
        let product = db.create_product(&new_product("Loft", 10.0, &[])).unwrap();

        db.add_to_wishlist(user.id, product.id).unwrap();
        let err = db.add_to_wishlist(user.id, product.id).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let items = db.list_wishlist(user.id).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product.id, product.id);
    }

    #[test]
    fn removing_absent_pair_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user(&new_user("Ann")).unwrap();
        let keep = db.create_product(&new_product("Keep", 10.0, &[])).unwrap();
        let drop = db.create_product(&new_product("Drop", 10.0, &[])).unwrap();

        db.add_to_wishlist(user.id, keep.id).unwrap();
        db.add_to_wishlist(user.id, drop.id).unwrap();

        let remaining = db.remove_from_wishlist(user.id, drop.id).unwrap();
        assert_eq!(remaining, vec![keep.id]);

        let err = db.remove_from_wishlist(user.id, drop.id).unwrap_err();
        assert!(matches!(err, StoreError::NotFound("wishlist entry")));
    }

    #[test]
    fn unknown_product_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user(&new_user("Ann")).unwrap();
        let err = db.add_to_wishlist(user.id, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound("product")));
    }

    #[test]
    fn deleting_product_clears_wishlist_entries() {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user(&new_user("Ann")).unwrap();
        let product = db.create_product(&new_product("Gone", 10.0, &[])).unwrap();
        db.add_to_wishlist(user.id, product.id).unwrap();

        db.delete_product(product.id).unwrap();
        assert!(db.wishlist_product_ids(user.id).unwrap().is_empty());
    }
}
