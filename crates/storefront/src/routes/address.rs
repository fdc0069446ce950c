//! Address book route handlers.
//!
//! The book lives in the session; checkout reads its default entry.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, State},
    response::Redirect,
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{instrument, warn};

use atelier_core::{AddressId, AddressLabel, ShippingAddress};

use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::{Flash, session_keys};
use crate::routes::Layout;
use crate::services::{AddressBook, AddressBookError};
use crate::state::AppState;

/// Read the session's address book. A missing or unreadable book is empty.
pub(crate) async fn load_book(session: &Session) -> AddressBook {
    session
        .get(session_keys::ADDRESS_BOOK)
        .await
        .ok()
        .flatten()
        .unwrap_or_default()
}

async fn save_book(session: &Session, book: &AddressBook) {
    if let Err(e) = session.insert(session_keys::ADDRESS_BOOK, book).await {
        warn!(error = %e, "Failed to store address book");
    }
}

/// Address form data, used for both add and edit.
#[derive(Debug, Deserialize)]
pub struct AddressForm {
    #[serde(default)]
    pub label: AddressLabel,
    pub full_name: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub phone: String,
    /// Checkbox: present when ticked.
    pub make_default: Option<String>,
}

impl AddressForm {
    fn parse(&self) -> Result<ShippingAddress, String> {
        ShippingAddress::parse(
            self.label,
            &self.full_name,
            &self.street,
            &self.city,
            &self.state,
            &self.postal_code,
            &self.phone,
        )
        .map_err(|e| format!("Please check the address: {e}"))
    }
}

/// Address book page template.
#[derive(Template, WebTemplate)]
#[template(path = "address/index.html")]
pub struct AddressTemplate {
    pub layout: Layout,
    pub book: AddressBook,
    pub labels: [AddressLabel; 3],
}

/// Display the address book.
#[instrument(skip(state, session, user))]
pub async fn index(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
) -> AddressTemplate {
    AddressTemplate {
        book: load_book(&session).await,
        layout: Layout::load(&state, &session, Some(&user)).await,
        labels: [AddressLabel::Home, AddressLabel::Office, AddressLabel::Other],
    }
}

/// Add an address.
#[instrument(skip(session, _user, form))]
pub async fn create(
    session: Session,
    RequireAuth(_user): RequireAuth,
    Form(form): Form<AddressForm>,
) -> Redirect {
    match form.parse() {
        Ok(address) => {
            let mut book = load_book(&session).await;
            book.add(address, form.make_default.is_some());
            save_book(&session, &book).await;
            Flash::success("Address saved").push(&session).await;
        }
        Err(message) => Flash::error(message).push(&session).await,
    }
    Redirect::to("/address")
}

fn book_message(error: &AddressBookError) -> &'static str {
    match error {
        AddressBookError::NotFound => "That address no longer exists",
        AddressBookError::LastAddress => "You need at least one address",
    }
}

/// Replace an address.
#[instrument(skip(session, _user, form))]
pub async fn update(
    session: Session,
    RequireAuth(_user): RequireAuth,
    Path(id): Path<AddressId>,
    Form(form): Form<AddressForm>,
) -> Redirect {
    let address = match form.parse() {
        Ok(address) => address,
        Err(message) => {
            Flash::error(message).push(&session).await;
            return Redirect::to("/address");
        }
    };

    let mut book = load_book(&session).await;
    let result = book.update(id, address).and_then(|()| {
        if form.make_default.is_some() {
            book.set_default(id)
        } else {
            Ok(())
        }
    });
    match result {
        Ok(()) => {
            save_book(&session, &book).await;
            Flash::success("Address updated").push(&session).await;
        }
        Err(e) => Flash::error(book_message(&e)).push(&session).await,
    }
    Redirect::to("/address")
}

/// Delete an address. The last one stays.
#[instrument(skip(session, _user))]
pub async fn delete(
    session: Session,
    RequireAuth(_user): RequireAuth,
    Path(id): Path<AddressId>,
) -> Redirect {
    let mut book = load_book(&session).await;
    match book.delete(id) {
        Ok(()) => {
            save_book(&session, &book).await;
            Flash::success("Address removed").push(&session).await;
        }
        Err(e) => Flash::error(book_message(&e)).push(&session).await,
    }
    Redirect::to("/address")
}

/// Make an address the default.
#[instrument(skip(session, _user))]
pub async fn set_default(
    session: Session,
    RequireAuth(_user): RequireAuth,
    Path(id): Path<AddressId>,
) -> Redirect {
    let mut book = load_book(&session).await;
    match book.set_default(id) {
        Ok(()) => {
            save_book(&session, &book).await;
            Flash::success("Default address updated").push(&session).await;
        }
        Err(e) => Flash::error(book_message(&e)).push(&session).await,
    }
    Redirect::to("/address")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use axum::http::StatusCode;

    use super::*;
    use crate::routes::tests::{Browser, body_text, location};

    pub(crate) const HOME_FORM: &str = "label=home&full_name=Asha+Rao&street=12+MG+Road\
        &city=Bengaluru&state=KA&postal_code=560001&phone=%2B919876543210";

    /// Id in the first `/address/{id}` form action on the page.
    pub(crate) fn first_address_id(page: &str) -> String {
        let start = page.find("/address/").unwrap() + "/address/".len();
        page[start..start + 36].to_string()
    }

    #[tokio::test]
    async fn test_address_book_requires_sign_in() {
        let mut browser = Browser::new();
        let response = browser.get("/address").await;
        assert_eq!(location(&response), "/login");
    }

    #[tokio::test]
    async fn test_add_and_list_addresses() {
        let mut browser = Browser::new();
        browser.sign_in().await;

        let response = browser.post("/address", HOME_FORM).await;
        assert_eq!(location(&response), "/address");

        let response = browser.get("/address").await;
        assert_eq!(response.status(), StatusCode::OK);
        let page = body_text(response).await;
        assert!(page.contains("Address saved"));
        assert!(page.contains("12 MG Road"));
        assert!(page.contains("Bengaluru, KA 560001"));
    }

    #[tokio::test]
    async fn test_invalid_address_is_rejected() {
        let mut browser = Browser::new();
        browser.sign_in().await;

        browser
            .post(
                "/address",
                "label=home&full_name=&street=x&city=y&state=z&postal_code=560001&phone=%2B919876543210",
            )
            .await;
        let page = body_text(browser.get("/address").await).await;
        assert!(page.contains("name is required"));
    }

    #[tokio::test]
    async fn test_last_address_cannot_be_deleted() {
        let mut browser = Browser::new();
        browser.sign_in().await;
        browser.post("/address", HOME_FORM).await;

        let page = body_text(browser.get("/address").await).await;
        let id = first_address_id(&page);
        browser.post(&format!("/address/{id}/delete"), "").await;
        let page = body_text(browser.get("/address").await).await;
        assert!(page.contains("You need at least one address"));
        assert!(page.contains("12 MG Road"));
    }
}
