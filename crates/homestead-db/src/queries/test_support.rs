use homestead_types::models::{Address, Role};

use crate::models::{NewProduct, NewUser};

pub(crate) fn new_user(name: &str) -> NewUser {
    NewUser {
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        password_hash: "hash".into(),
        phone_number: Some("5550100".into()),
        address: Address {
            city: "Lisbon".into(),
            street: "Rua 1".into(),
        },
        role: Role::User,
    }
}

pub(crate) fn new_product(title: &str, price: f64, category: &[&str]) -> NewProduct {
    NewProduct {
        title: title.to_string(),
        description: format!("{} description", title),
        price,
        kind: "House".into(),
        category: category.iter().map(|c| c.to_string()).collect(),
        display_image: "/uploads/display-image/d.png".into(),
        images: vec!["/uploads/product-image/1.png".into()],
        status: "available".into(),
        location: "Lisbon".into(),
        beds: Some(3),
        baths: Some(2),
    }
}
