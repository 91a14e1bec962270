use super::{Marketplace, MarketplaceError};
use crate::entities::decode_optional;
use crate::models::ProductRecord;
use reqwest::{Client, header};
use serde::Deserialize;
use urlencoding::encode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemLookup {
    /// No item id in the URL (category page, search page, ...).
    NotApplicable,
    /// The item API answered with a non-success status.
    Unavailable { status: u16 },
    Found(ProductRecord),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrowseItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    short_description: Option<String>,
    #[serde(default)]
    image: Option<BrowseImage>,
    #[serde(default)]
    additional_images: Option<Vec<BrowseImage>>,
    #[serde(default)]
    price: Option<BrowsePrice>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrowseImage {
    #[serde(default)]
    image_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BrowsePrice {
    #[serde(default)]
    value: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<BrowseItem> for ProductRecord {
    fn from(item: BrowseItem) -> Self {
        let primary = non_empty(item.image.and_then(|img| img.image_url));
        let image = primary.or_else(|| {
            non_empty(
                item.additional_images
                    .into_iter()
                    .flatten()
                    .next()
                    .and_then(|img| img.image_url),
            )
        });
        ProductRecord {
            image,
            title: decode_optional(non_empty(item.title)),
            price: non_empty(item.price.and_then(|p| p.value)),
            description: decode_optional(non_empty(item.short_description)),
        }
    }
}

pub(super) fn item_url(marketplace: &Marketplace, item_id: &str) -> String {
    let def = marketplace.definition();
    let reference = def.item_reference.replace("{id}", item_id);
    let path = def.item_path.replace("{id}", &encode(&reference));
    format!("{}{}", def.api_root.trim_end_matches('/'), path)
}

pub(super) async fn fetch_item(
    http: &Client,
    marketplace: &Marketplace,
    item_id: &str,
    access_token: &str,
) -> Result<ItemLookup, MarketplaceError> {
    let response = http
        .get(item_url(marketplace, item_id))
        .bearer_auth(access_token)
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-EBAY-C-MARKETPLACE-ID", marketplace.definition().region.as_str())
        .send()
        .await
        .map_err(|err| MarketplaceError::Item(err.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Ok(ItemLookup::Unavailable {
            status: status.as_u16(),
        });
    }

    let item: BrowseItem = response
        .json()
        .await
        .map_err(|err| MarketplaceError::Item(err.to_string()))?;
    Ok(ItemLookup::Found(item.into()))
}
