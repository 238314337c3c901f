use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use homestead_types::models::slugify;

use super::{json_list_col, now_ts, ts_col, uuid_col};
use crate::models::{NewProduct, ProductFilter, ProductRow};
use crate::{Database, Result, StoreError};

pub(crate) const PRODUCT_COLUMNS: &str = "p.id, p.title, p.slug, p.description, p.price, p.kind, p.category, p.display_image, p.images, p.status, p.location, p.beds, p.baths, p.created_at, p.updated_at";

/// Number of columns in `PRODUCT_COLUMNS`, for callers that select more after it.
pub(crate) const PRODUCT_COLUMN_COUNT: usize = 15;

impl Database {
    // -- Products --

    pub fn create_product(&self, new: &NewProduct) -> Result<ProductRow> {
        validate_price(new.price)?;
        self.with_conn(|conn| {
            let id = Uuid::new_v4();
            let (_, now) = now_ts();
            conn.execute(
                "INSERT INTO products (id, title, slug, description, price, kind, category, display_image, images, status, location, beds, baths, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
                rusqlite::params![
                    id.to_string(),
                    new.title,
                    slugify(&new.title),
                    new.description,
                    new.price,
                    new.kind,
                    serde_json::to_string(&new.category)?,
                    new.display_image,
                    serde_json::to_string(&new.images)?,
                    new.status,
                    new.location,
                    new.beds,
                    new.baths,
                    now,
                ],
            )?;
            query_product(conn, id)?.ok_or(StoreError::NotFound("product"))
        })
    }

    pub fn get_product(&self, id: Uuid) -> Result<Option<ProductRow>> {
        self.with_conn(|conn| query_product(conn, id))
    }

    /// Slugs are not unique; the oldest listing wins.
    pub fn get_product_by_slug(&self, slug: &str) -> Result<Option<ProductRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM products p WHERE p.slug = ?1 ORDER BY p.created_at, p.id LIMIT 1",
                PRODUCT_COLUMNS
            );
            let row = conn
                .prepare_cached(&sql)?
                .query_row([slug], |row| product_from_row(row, 0))
                .optional()?;
            Ok(row)
        })
    }

    /// One page of listings plus the total number matching the filter.
    pub fn list_products(&self, filter: &ProductFilter) -> Result<(Vec<ProductRow>, u64)> {
        self.with_conn(|conn| {
            let mut clauses: Vec<String> = Vec::new();
            let mut params: Vec<Value> = Vec::new();

            if !filter.categories.is_empty() {
                let placeholders: Vec<String> = filter
                    .categories
                    .iter()
                    .map(|c| {
                        params.push(Value::Text(c.clone()));
                        format!("?{}", params.len())
                    })
                    .collect();
                clauses.push(format!(
                    "EXISTS (SELECT 1 FROM json_each(p.category) WHERE json_each.value IN ({}))",
                    placeholders.join(", ")
                ));
            }
            if let Some(search) = &filter.search {
                params.push(Value::Text(format!("%{}%", escape_like(search))));
                clauses.push(format!("p.title LIKE ?{} ESCAPE '\\'", params.len()));
            }
            if let Some(kind) = &filter.kind {
                params.push(Value::Text(kind.clone()));
                clauses.push(format!("p.kind = ?{}", params.len()));
            }

            let where_sql = if clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", clauses.join(" AND "))
            };

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM products p {}", where_sql),
                rusqlite::params_from_iter(params.iter()),
                |row| row.get(0),
            )?;

            let order = if filter.descending { "DESC" } else { "ASC" };
            params.push(Value::Integer(i64::from(filter.limit)));
            let limit_idx = params.len();
            params.push(Value::Integer(filter.offset() as i64));
            let offset_idx = params.len();

            let sql = format!(
                "SELECT {} FROM products p {} ORDER BY {} {}, p.id LIMIT ?{} OFFSET ?{}",
                PRODUCT_COLUMNS,
                where_sql,
                filter.sort.column(),
                order,
                limit_idx,
                offset_idx
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                    product_from_row(row, 0)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((rows, total as u64))
        })
    }

    /// Persist every editable field of `product`. The slug follows the title.
    pub fn update_product(&self, product: &ProductRow) -> Result<ProductRow> {
        validate_price(product.price)?;
        self.with_conn(|conn| {
            let (_, now) = now_ts();
            let changed = conn.execute(
                "UPDATE products SET
                    title = ?2, slug = ?3, description = ?4, price = ?5, kind = ?6,
                    category = ?7, display_image = ?8, images = ?9, status = ?10,
                    location = ?11, beds = ?12, baths = ?13, updated_at = ?14
                 WHERE id = ?1",
                rusqlite::params![
                    product.id.to_string(),
                    product.title,
                    slugify(&product.title),
                    product.description,
                    product.price,
                    product.kind,
                    serde_json::to_string(&product.category)?,
                    product.display_image,
                    serde_json::to_string(&product.images)?,
                    product.status,
                    product.location,
                    product.beds,
                    product.baths,
                    now,
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("product"));
            }
            query_product(conn, product.id)?.ok_or(StoreError::NotFound("product"))
        })
    }

    /// Delete a listing and return it so the caller can remove its image files.
    pub fn delete_product(&self, id: Uuid) -> Result<ProductRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let product = query_product(&tx, id)?.ok_or(StoreError::NotFound("product"))?;
            tx.execute("DELETE FROM products WHERE id = ?1", [id.to_string()])?;
            tx.commit()?;
            Ok(product)
        })
    }
}

fn validate_price(price: f64) -> Result<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(StoreError::Validation("price must be a non-negative number".into()));
    }
    Ok(())
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

pub(crate) fn query_product(conn: &Connection, id: Uuid) -> Result<Option<ProductRow>> {
    let sql = format!("SELECT {} FROM products p WHERE p.id = ?1", PRODUCT_COLUMNS);
    let row = conn
        .prepare_cached(&sql)?
        .query_row([id.to_string()], |row| product_from_row(row, 0))
        .optional()?;
    Ok(row)
}

/// Decode `PRODUCT_COLUMNS` starting at column `base`.
pub(crate) fn product_from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<ProductRow> {
    Ok(ProductRow {
        id: uuid_col(row, base)?,
        title: row.get(base + 1)?,
        slug: row.get(base + 2)?,
        description: row.get(base + 3)?,
        price: row.get(base + 4)?,
        kind: row.get(base + 5)?,
        category: json_list_col(row, base + 6)?,
        display_image: row.get(base + 7)?,
        images: json_list_col(row, base + 8)?,
        status: row.get(base + 9)?,
        location: row.get(base + 10)?,
        beds: row.get(base + 11)?,
        baths: row.get(base + 12)?,
        created_at: ts_col(row, base + 13)?,
        updated_at: ts_col(row, base + 14)?,
    })
}
