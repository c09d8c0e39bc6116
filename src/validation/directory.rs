use garde::Validate;
use serde::Deserialize;

use crate::{
    error::Result,
    models::role::Role,
    repositories::{question::QuestionFields, store::StoreFields},
    validation::checklist::{positive_coefficient, report_to_error},
};

/// Create (no `id`) or update (with `id`) a question.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRequest {
    #[garde(range(min = 1))]
    pub id: Option<i32>,
    #[garde(length(chars, min = 1, max = 1000))]
    pub question_text: String,
    #[garde(custom(positive_coefficient))]
    pub coefficient: f64,
    #[serde(default)]
    #[garde(range(min = 0))]
    pub sort_order: i32,
}

impl QuestionRequest {
    pub fn into_fields(self) -> Result<(Option<i32>, QuestionFields)> {
        self.validate().map_err(report_to_error)?;
        Ok((
            self.id,
            QuestionFields {
                question_text: self.question_text.trim().to_string(),
                coefficient: self.coefficient,
                sort_order: self.sort_order,
            },
        ))
    }
}

/// Create (no `id`) or update (with `id`) a store.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StoreRequest {
    #[garde(range(min = 1))]
    pub id: Option<i32>,
    #[garde(length(chars, min = 1, max = 200))]
    pub store_name: String,
    #[garde(length(chars, max = 50))]
    pub store_code: Option<String>,
}

impl StoreRequest {
    pub fn into_fields(self) -> Result<(Option<i32>, StoreFields)> {
        self.validate().map_err(report_to_error)?;
        Ok((
            self.id,
            StoreFields {
                store_name: self.store_name.trim().to_string(),
                store_code: self
                    .store_code
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty()),
            },
        ))
    }
}

/// Pre-provisions a user before their first sign-in.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddUserRequest {
    #[garde(email)]
    pub email: String,
    #[garde(length(chars, min = 1, max = 200))]
    pub display_name: String,
    #[serde(default = "default_new_role")]
    #[garde(skip)]
    pub role: Role,
}

fn default_new_role() -> Role {
    Role::AreaManager
}

impl AddUserRequest {
    pub fn check(&self) -> Result<()> {
        self.validate().map_err(report_to_error)
    }
}

/// One row of a bulk import. Rows are checked one by one so a bad row is
/// reported without failing the batch.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUserRow {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Option<Role>,
}

impl BulkUserRow {
    pub fn into_request(self) -> std::result::Result<AddUserRequest, String> {
        let email = self.email.filter(|e| !e.trim().is_empty());
        let display_name = self.display_name.filter(|n| !n.trim().is_empty());
        match (email, display_name) {
            (Some(email), Some(display_name)) => Ok(AddUserRequest {
                email: email.trim().to_string(),
                display_name,
                role: self.role.unwrap_or_else(default_new_role),
            }),
            _ => Err("email and display name are required".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkImportRequest {
    #[serde(default)]
    pub users: Vec<BulkUserRow>,
}

#[derive(Debug, Deserialize)]
pub struct RoleChangeRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRequest {
    #[garde(range(min = 1))]
    pub user_id: i32,
    #[garde(range(min = 1))]
    pub store_id: i32,
}

impl AssignmentRequest {
    pub fn check(&self) -> Result<()> {
        self.validate().map_err(report_to_error)
    }
}
