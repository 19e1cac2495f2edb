use bytes::Bytes;
use serde::Deserialize;

use crate::{error::AppError, listings::repo_types::NewListing};

const MAX_TITLE: usize = 100;
const MAX_LOCATION: usize = 120;

/// Listing fields exactly as received, before validation.
#[derive(Debug, Default, Clone)]
pub struct ListingFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
}

/// JSON flavour of a listing write. `price` may be a number or a string.
#[derive(Debug, Default, Deserialize)]
pub struct ListingJson {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<serde_json::Value>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
}

impl TryFrom<ListingJson> for ListingFields {
    type Error = AppError;

    fn try_from(body: ListingJson) -> Result<Self, Self::Error> {
        let price = match body.price {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            Some(serde_json::Value::String(s)) => Some(s),
            Some(_) => return Err(AppError::validation("price must be a number")),
        };
        Ok(Self {
            title: body.title,
            description: body.description,
            price,
            category: body.category,
            location: body.location,
            image_url: body.image_url,
        })
    }
}

/// A file part from a multipart listing write.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub body: Bytes,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "heic"];

impl UploadedFile {
    pub fn check_image(&self) -> Result<(), AppError> {
        let ext = self
            .filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            return Err(AppError::validation(format!(
                "Unsupported image type; expected one of: {}",
                IMAGE_EXTENSIONS.join(", ")
            )));
        }
        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn check_len(value: &str, max: usize, field: &str) -> Result<(), AppError> {
    if value.chars().count() > max {
        return Err(AppError::validation(format!("{field} is too long")));
    }
    Ok(())
}

/// Price must be a finite, non-negative number.
pub fn parse_price(raw: &str) -> Result<f64, AppError> {
    let price: f64 = raw
        .trim()
        .parse()
        .map_err(|_| AppError::validation("price must be a number"))?;
    if !price.is_finite() {
        return Err(AppError::validation("price must be a number"));
    }
    if price < 0.0 {
        return Err(AppError::validation("price cannot be negative"));
    }
    // normalizes -0.0
    Ok(price.abs())
}

pub fn parse_category(raw: &str) -> Result<String, AppError> {
    let category = match raw.trim().to_ascii_lowercase().as_str() {
        "product" => "Product",
        "service" => "Service",
        _ => return Err(AppError::validation("category must be Product or Service")),
    };
    Ok(category.to_string())
}

impl ListingFields {
    /// Validates the fields of a new listing.
    pub fn into_new(self) -> Result<NewListing, AppError> {
        let title =
            non_blank(self.title).ok_or_else(|| AppError::validation("title is required"))?;
        check_len(&title, MAX_TITLE, "title")?;
        let price = non_blank(self.price).ok_or_else(|| AppError::validation("price is required"))?;
        let price = parse_price(&price)?;
        let category = match non_blank(self.category) {
            Some(c) => parse_category(&c)?,
            None => "Product".to_string(),
        };
        let location = non_blank(self.location).unwrap_or_default();
        check_len(&location, MAX_LOCATION, "location")?;

        Ok(NewListing {
            title,
            description: self.description.map(|d| d.trim().to_string()).unwrap_or_default(),
            price,
            category,
            location,
            image_url: non_blank(self.image_url),
        })
    }

    /// Validates a partial update; absent or blank fields are left untouched.
    pub fn into_patch(self) -> Result<ListingPatch, AppError> {
        let title = non_blank(self.title);
        if let Some(t) = &title {
            check_len(t, MAX_TITLE, "title")?;
        }
        let location = non_blank(self.location);
        if let Some(l) = &location {
            check_len(l, MAX_LOCATION, "location")?;
        }
        Ok(ListingPatch {
            title,
            description: self.description.map(|d| d.trim().to_string()),
            price: non_blank(self.price).map(|p| parse_price(&p)).transpose()?,
            category: non_blank(self.category)
                .map(|c| parse_category(&c))
                .transpose()?,
            location,
            image_url: non_blank(self.image_url),
        })
    }
}

/// Fields to change on an existing listing.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ListingPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(title: &str, price: &str) -> ListingFields {
        ListingFields {
            title: Some(title.into()),
            price: Some(price.into()),
            ..Default::default()
        }
    }

    #[test]
    fn price_parsing() {
        assert_eq!(parse_price("500").unwrap(), 500.0);
        assert_eq!(parse_price(" 12.5 ").unwrap(), 12.5);
        assert_eq!(parse_price("0").unwrap(), 0.0);
        assert!(parse_price("-1").is_err());
        assert!(parse_price("abc").is_err());
        assert!(parse_price("NaN").is_err());
        assert!(parse_price("inf").is_err());
        assert!(parse_price("").is_err());
    }

    #[test]
    fn new_listing_defaults() {
        let new = fields("Chair", "500").into_new().unwrap();
        assert_eq!(new.category, "Product");
        assert_eq!(new.description, "");
        assert_eq!(new.image_url, None);
    }

    #[test]
    fn new_listing_requires_title_and_price() {
        assert!(matches!(fields(" ", "5").into_new(), Err(AppError::Validation(_))));
        let no_price = ListingFields {
            title: Some("Chair".into()),
            ..Default::default()
        };
        assert!(matches!(no_price.into_new(), Err(AppError::Validation(_))));
        assert!(matches!(fields("Chair", "-3").into_new(), Err(AppError::Validation(_))));
        assert!(matches!(fields("Chair", "cheap").into_new(), Err(AppError::Validation(_))));
    }

    #[test]
    fn category_is_canonicalized() {
        let new = ListingFields {
            category: Some("service".into()),
            ..fields("Plumbing", "1000")
        }
        .into_new()
        .unwrap();
        assert_eq!(new.category, "Service");
        let bad = ListingFields {
            category: Some("Vehicle".into()),
            ..fields("Car", "1")
        };
        assert!(bad.into_new().is_err());
    }

    #[test]
    fn patch_ignores_absent_and_blank_fields() {
        let patch = ListingFields {
            title: Some("".into()),
            price: Some("750".into()),
            image_url: Some("  ".into()),
            ..Default::default()
        }
        .into_patch()
        .unwrap();
        assert_eq!(
            patch,
            ListingPatch {
                price: Some(750.0),
                ..Default::default()
            }
        );
        assert!(ListingFields {
            price: Some("-1".into()),
            ..Default::default()
        }
        .into_patch()
        .is_err());
    }

    #[test]
    fn json_price_accepts_number_or_string() {
        let body: ListingJson = serde_json::from_str(r#"{"title":"Chair","price":500}"#).unwrap();
        let f = ListingFields::try_from(body).unwrap();
        assert_eq!(parse_price(f.price.as_deref().unwrap()).unwrap(), 500.0);

        let body: ListingJson = serde_json::from_str(r#"{"title":"Chair","price":"12.5"}"#).unwrap();
        assert_eq!(ListingFields::try_from(body).unwrap().price.as_deref(), Some("12.5"));

        let body: ListingJson = serde_json::from_str(r#"{"title":"Chair","price":[1]}"#).unwrap();
        assert!(ListingFields::try_from(body).is_err());
    }

    #[test]
    fn only_images_are_accepted() {
        let file = |name: &str| UploadedFile {
            filename: name.into(),
            body: Bytes::from_static(b"x"),
        };
        assert!(file("chair.JPG").check_image().is_ok());
        assert!(file("chair.webp").check_image().is_ok());
        assert!(file("evil.html").check_image().is_err());
        assert!(file("noext").check_image().is_err());
    }
}
