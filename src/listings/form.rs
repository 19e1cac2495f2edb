use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
    Json,
};
use tracing::debug;

use crate::{
    error::AppError,
    listings::dto::{ListingFields, ListingJson, UploadedFile},
};

/// Body of a listing write: `multipart/form-data` (text fields plus an
/// optional `file` part) or a JSON object.
#[derive(Debug, Default)]
pub struct ListingForm {
    pub fields: ListingFields,
    pub file: Option<UploadedFile>,
}

#[async_trait]
impl<S> FromRequest<S> for ListingForm
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("multipart/form-data"))
            .unwrap_or(false);

        if is_multipart {
            let multipart = Multipart::from_request(req, state).await?;
            return read_multipart(multipart).await;
        }

        let Json(body) = Json::<ListingJson>::from_request(req, state).await?;
        Ok(ListingForm {
            fields: body.try_into()?,
            file: None,
        })
    }
}

async fn read_multipart(mut mp: Multipart) -> Result<ListingForm, AppError> {
    let mut form = ListingForm::default();
    while let Some(field) = mp.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let filename = field.file_name().unwrap_or_default().to_string();
            let body = field.bytes().await?;
            // browsers send an empty part when no file was picked
            if filename.is_empty() && body.is_empty() {
                continue;
            }
            let file = UploadedFile { filename, body };
            file.check_image()?;
            form.file = Some(file);
            continue;
        }

        let slot = match name.as_str() {
            "title" => &mut form.fields.title,
            "description" => &mut form.fields.description,
            "price" => &mut form.fields.price,
            "category" => &mut form.fields.category,
            "location" => &mut form.fields.location,
            "image_url" => &mut form.fields.image_url,
            other => {
                debug!(field = %other, "ignoring unknown multipart field");
                continue;
            }
        };
        *slot = Some(field.text().await?);
    }
    Ok(form)
}
