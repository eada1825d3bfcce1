use serde::{Deserialize, Serialize};

use crate::db::Record;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: i32,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub is_admin: bool,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub username: String,
    pub is_admin: bool,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateRecordRequest {
    pub record_type: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRecordRequest {
    pub record_id: i32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRecordParams {
    pub record_id: i32,
}

#[derive(Debug, Deserialize)]
pub struct ReadRecordsParams {
    #[serde(default)]
    pub record_type: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

const fn default_limit() -> u64 {
    10
}

#[derive(Debug, Serialize)]
pub struct RecordDto {
    pub id: i32,
    pub title: String,
    pub record_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
    pub is_active: bool,
}

impl From<Record> for RecordDto {
    fn from(record: Record) -> Self {
        Self {
            id: record.id,
            title: record.title,
            record_type: record.record_type,
            description: record.description,
            created_by: record.created_by,
            created_at: record.created_at,
            updated_at: record.updated_at,
            is_active: record.is_active,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecordListResponse {
    pub count: usize,
    pub records: Vec<RecordDto>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

#[derive(Debug, Serialize)]
pub struct DbStatusResponse {
    pub database: String,
    pub connection: String,
}
