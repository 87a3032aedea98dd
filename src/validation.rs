use std::collections::BTreeMap;

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use tracing::debug;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::AppError;

/// JSON body that has been deserialized and then checked with [`Validate`].
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|rejection| {
            debug!(error = %rejection.body_text(), "json body rejected");
            AppError::BadRequest(rejection.body_text())
        })?;
        value.validate().map_err(field_messages)?;
        Ok(ValidatedJson(value))
    }
}

/// Flattens validator output into one message per field.
pub fn field_messages(errors: ValidationErrors) -> AppError {
    let mut out = BTreeMap::new();
    for (field, errs) in errors.field_errors() {
        if let Some(err) = errs.first() {
            out.insert(field.to_string(), describe(&field.to_string(), err));
        }
    }
    AppError::Validation(out)
}

fn describe(field: &str, err: &ValidationError) -> String {
    if let Some(message) = &err.message {
        return message.to_string();
    }
    match err.code.as_ref() {
        "length" => {
            let len = err
                .params
                .get("value")
                .and_then(|v| v.as_str())
                .map(|s| s.chars().count());
            let min = err.params.get("min").and_then(|v| v.as_u64());
            let max = err.params.get("max").and_then(|v| v.as_u64());
            match (len, min, max) {
                (Some(0), _, _) => format!("{field} is required"),
                (Some(len), Some(min), _) if (len as u64) < min => {
                    format!("{field} must be at least {min} characters")
                }
                (_, _, Some(max)) => format!("{field} must be at most {max} characters"),
                _ => format!("Invalid value for {field}"),
            }
        }
        "required" => format!("{field} is required"),
        _ => format!("Invalid value for {field}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct Body {
        #[serde(default)]
        #[validate(length(min = 3, max = 5))]
        name: String,
    }

    fn message_for(name: &str) -> String {
        let body = Body { name: name.into() };
        match field_messages(body.validate().unwrap_err()) {
            AppError::Validation(fields) => fields["name"].clone(),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_value_is_required() {
        assert_eq!(message_for(""), "name is required");
    }

    #[test]
    fn short_and_long_values() {
        assert_eq!(message_for("ab"), "name must be at least 3 characters");
        assert_eq!(message_for("abcdef"), "name must be at most 5 characters");
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let body = Body { name: "ééé".into() };
        assert!(body.validate().is_ok());
    }
}
