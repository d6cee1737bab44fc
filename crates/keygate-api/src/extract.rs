//! Request extractors
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use axum::extract::FromRequest;

/// `Json<T>` whose rejection is an [`AppError`], so malformed bodies get a
/// 400 with the standard error body instead of axum's plain-text 422
#[derive(Debug, Clone, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);
