//! Database row types. Distinct from the API types so the store can carry
//! fields (password hashes, sequence numbers) that never go on the wire.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use homestead_types::api::{
    LastMessagePreview, MessageResponse, ParticipantSummary, ProductListQuery, ProductResponse,
    ProductSummary, UserResponse,
};
use homestead_types::models::{Address, Role};

use crate::{Result, StoreError};

// -- Users --

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone_number: Option<String>,
    pub address: Address,
    pub profile_image: Option<String>,
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    pub fn into_response(self, wishlist: Vec<Uuid>) -> UserResponse {
        UserResponse {
            id: self.id,
            name: self.name,
            email: self.email,
            phone_number: self.phone_number,
            address: self.address,
            profile_image: self.profile_image,
            role: self.role,
            wishlist,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn summary(&self) -> ParticipantSummary {
        ParticipantSummary {
            id: self.id,
            name: self.name.clone(),
            profile_image: self.profile_image.clone(),
        }
    }
}

pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone_number: Option<String>,
    pub address: Address,
    pub role: Role,
}

/// Profile edit. `None` leaves a field unchanged.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone_number: Option<String>,
    pub city: Option<String>,
    pub street: Option<String>,
    pub profile_image: Option<String>,
}

// -- Products --

#[derive(Debug, Clone)]
pub struct ProductRow {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub price: f64,
    pub kind: String,
    pub category: Vec<String>,
    pub display_image: String,
    pub images: Vec<String>,
    pub status: String,
    pub location: String,
    pub beds: Option<u32>,
    pub baths: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductRow {
    pub fn summary(&self) -> ProductSummary {
        ProductSummary {
            id: self.id,
            title: self.title.clone(),
            slug: self.slug.clone(),
            price: self.price,
            display_image: self.display_image.clone(),
        }
    }
}

impl From<ProductRow> for ProductResponse {
    fn from(row: ProductRow) -> Self {
        ProductResponse {
            id: row.id,
            title: row.title,
            slug: row.slug,
            description: row.description,
            price: row.price,
            kind: row.kind,
            category: row.category,
            display_image: row.display_image,
            images: row.images,
            status: row.status,
            location: row.location,
            beds: row.beds,
            baths: row.baths,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub struct NewProduct {
    pub title: String,
    pub description: String,
    pub price: f64,
    pub kind: String,
    pub category: Vec<String>,
    pub display_image: String,
    pub images: Vec<String>,
    pub status: String,
    pub location: String,
    pub beds: Option<u32>,
    pub baths: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductSort {
    Price,
    Title,
    CreatedAt,
}

impl ProductSort {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            Self::Price => "p.price",
            Self::Title => "p.title",
            Self::CreatedAt => "p.created_at",
        }
    }
}

pub const DEFAULT_PAGE_SIZE: u32 = 12;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Normalized listing query.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductFilter {
    pub page: u32,
    pub limit: u32,
    pub categories: Vec<String>,
    pub search: Option<String>,
    pub kind: Option<String>,
    pub sort: ProductSort,
    pub descending: bool,
}

impl Default for ProductFilter {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            categories: Vec::new(),
            search: None,
            kind: None,
            sort: ProductSort::CreatedAt,
            descending: true,
        }
    }
}

impl ProductFilter {
    pub fn from_query(query: &ProductListQuery) -> Result<Self> {
        let mut filter = Self {
            page: query.page.unwrap_or(1).max(1),
            limit: query
                .limit
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
            ..Self::default()
        };

        if let Some(category) = &query.category {
            filter.categories = category
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
        }
        filter.search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        filter.kind = query
            .kind
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(str::to_string);

        if let Some(sort) = query.sort.as_deref().filter(|s| !s.is_empty()) {
            let (key, order) = sort.split_once(':').unwrap_or((sort, "asc"));
            filter.sort = match key {
                "price" => ProductSort::Price,
                "title" => ProductSort::Title,
                "createdAt" | "created_at" => ProductSort::CreatedAt,
                other => {
                    return Err(StoreError::Validation(format!(
                        "cannot sort by '{}'",
                        other
                    )));
                }
            };
            filter.descending = order == "desc";
        }

        Ok(filter)
    }

    pub(crate) fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

// -- Wishlist --

#[derive(Debug, Clone)]
pub struct WishlistRow {
    pub product: ProductRow,
    pub added_at: DateTime<Utc>,
}

// -- Chat --

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationRow {
    pub id: Uuid,
    /// Sorted ascending.
    pub participants: [Uuid; 2],
    pub product_id: Option<Uuid>,
    pub last_message_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationRow {
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    /// The other participant. Only meaningful when `user_id` participates.
    pub fn counterpart(&self, user_id: Uuid) -> Uuid {
        if self.participants[0] == user_id {
            self.participants[1]
        } else {
            self.participants[0]
        }
    }
}

/// A conversation with the joined data a conversation list needs.
#[derive(Debug, Clone)]
pub struct ConversationView {
    pub conversation: ConversationRow,
    pub participants: Vec<ParticipantSummary>,
    pub product: Option<ProductSummary>,
    pub last_message: Option<LastMessagePreview>,
}

impl ConversationView {
    pub fn into_response(self, viewer: Uuid) -> homestead_types::api::ConversationResponse {
        let counterpart_id = self.conversation.counterpart(viewer);
        let counterpart = self
            .participants
            .iter()
            .find(|p| p.id == counterpart_id)
            .cloned()
            .unwrap_or_else(|| ParticipantSummary {
                id: counterpart_id,
                name: String::new(),
                profile_image: None,
            });

        homestead_types::api::ConversationResponse {
            id: self.conversation.id,
            participants: self.participants,
            counterpart,
            product: self.product,
            last_message: self.last_message,
            created_at: self.conversation.created_at,
            updated_at: self.conversation.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow {
    pub seq: i64,
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub text: String,
    pub attachments: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub read_by: Vec<Uuid>,
}

impl From<MessageRow> for MessageResponse {
    fn from(row: MessageRow) -> Self {
        MessageResponse {
            id: row.id,
            seq: row.seq,
            conversation_id: row.conversation_id,
            sender_id: row.sender_id,
            sender_name: row.sender_name,
            text: row.text,
            attachments: row.attachments,
            created_at: row.created_at,
            read_by: row.read_by,
        }
    }
}

pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub text: String,
    pub attachments: Vec<String>,
}
