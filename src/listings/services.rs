use tracing::{info, warn};

use crate::{
    error::{AppError, AppResult},
    listings::{
        dto::{ListingPatch, UploadedFile},
        repo_types::{Listing, NewListing},
    },
    state::AppState,
    storage::upload_key,
};

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Listing {} not found", id))
}

pub async fn list_all(st: &AppState) -> AppResult<Vec<Listing>> {
    Ok(st.listings.list_all().await?)
}

pub async fn get(st: &AppState, id: i64) -> AppResult<Listing> {
    st.listings.get(id).await?.ok_or_else(|| not_found(id))
}

/// Loads a listing and checks that `owner_id` may change it.
async fn owned(st: &AppState, id: i64, owner_id: i64) -> AppResult<Listing> {
    let listing = get(st, id).await?;
    if listing.user_id != owner_id {
        warn!(listing_id = id, owner = listing.user_id, caller = owner_id, "not the owner");
        return Err(AppError::Forbidden(
            "You can only modify your own listings".into(),
        ));
    }
    Ok(listing)
}

/// Writes an upload and returns its storage key.
async fn store_upload(st: &AppState, file: UploadedFile) -> AppResult<String> {
    let key = upload_key(&file.filename);
    st.storage
        .put_object(&key, file.body)
        .await
        .map_err(AppError::Storage)?;
    Ok(key)
}

/// Local upload URLs only enter a listing through `store_upload`, so every
/// stored file belongs to exactly one listing. `current` is the URL the
/// listing already holds, which may be sent back unchanged.
fn check_image_url(st: &AppState, url: Option<&str>, current: Option<&str>) -> AppResult<()> {
    match url {
        Some(u) if url != current && st.storage.key_for_url(u).is_some() => Err(
            AppError::validation("image_url must be an external URL; upload a file instead"),
        ),
        _ => Ok(()),
    }
}

/// Best-effort removal of a stored upload referenced by `url`.
async fn discard_image(st: &AppState, url: Option<&str>) {
    let Some(key) = url.and_then(|u| st.storage.key_for_url(u)) else {
        return;
    };
    if let Err(e) = st.storage.delete_object(&key).await {
        warn!(error = %e, %key, "failed to remove upload");
    }
}

pub async fn create(
    st: &AppState,
    owner_id: i64,
    mut new: NewListing,
    file: Option<UploadedFile>,
) -> AppResult<Listing> {
    check_image_url(st, new.image_url.as_deref(), None)?;
    let stored = match file {
        Some(file) => {
            let key = store_upload(st, file).await?;
            new.image_url = Some(st.storage.public_url(&key));
            new.image_url.clone()
        }
        None => None,
    };

    match st.listings.insert(owner_id, new).await {
        Ok(listing) => {
            info!(listing_id = listing.id, owner_id, "listing created");
            Ok(listing)
        }
        Err(e) => {
            discard_image(st, stored.as_deref()).await;
            Err(e.into())
        }
    }
}

pub async fn update(
    st: &AppState,
    id: i64,
    owner_id: i64,
    patch: ListingPatch,
    file: Option<UploadedFile>,
) -> AppResult<Listing> {
    let current = owned(st, id, owner_id).await?;
    check_image_url(st, patch.image_url.as_deref(), current.image_url.as_deref())?;

    let mut next = current.clone();
    if let Some(title) = patch.title {
        next.title = title;
    }
    if let Some(description) = patch.description {
        next.description = description;
    }
    if let Some(price) = patch.price {
        next.price = price;
    }
    if let Some(category) = patch.category {
        next.category = category;
    }
    if let Some(location) = patch.location {
        next.location = location;
    }
    if let Some(url) = patch.image_url {
        next.image_url = Some(url);
    }

    let stored = match file {
        Some(file) => {
            let key = store_upload(st, file).await?;
            next.image_url = Some(st.storage.public_url(&key));
            next.image_url.clone()
        }
        None => None,
    };

    let saved = match st.listings.update(&next).await {
        Ok(Some(saved)) => saved,
        Ok(None) => {
            discard_image(st, stored.as_deref()).await;
            return Err(not_found(id));
        }
        Err(e) => {
            discard_image(st, stored.as_deref()).await;
            return Err(e.into());
        }
    };

    if current.image_url != saved.image_url {
        discard_image(st, current.image_url.as_deref()).await;
    }
    info!(listing_id = id, owner_id, "listing updated");
    Ok(saved)
}

pub async fn delete(st: &AppState, id: i64, owner_id: i64) -> AppResult<()> {
    let listing = owned(st, id, owner_id).await?;
    if !st.listings.delete(id).await? {
        return Err(not_found(id));
    }
    discard_image(st, listing.image_url.as_deref()).await;
    info!(listing_id = id, owner_id, "listing deleted");
    Ok(())
}
