use async_trait::async_trait;
use reqwest::{
    header::ACCEPT,
    multipart::{Form, Part},
    Client, RequestBuilder, StatusCode, Url,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::source::CatalogSource;
use crate::{
    config::AppConfig,
    error::{make_failure, ApiFailure},
    models::{CatalogEntry, EntryDraft, EntryId, ImageUpload, NewEntry},
};

const COLLECTION: [&str; 2] = ["api", "cars"];
const IMAGES: &str = "images";
const USER_AGENT: &str = concat!("carlot/", env!("CARGO_PKG_VERSION"));

/// HTTP client for one catalog service origin.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    client: Client,
    base: Url,
}

/// Error document returned by the service on non-success statuses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<Value>,
    #[serde(default)]
    details: Option<Value>,
}

impl CatalogClient {
    /// Build a client for the service at `base`.
    pub fn new(base: Url) -> Result<Self, ApiFailure> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| ApiFailure::transport(format!("failed to build HTTP client: {err}")))?;
        Ok(Self::with_client(client, base))
    }

    /// Build a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: Client, base: Url) -> Self {
        Self { client, base }
    }

    /// Build a client for the origin named in the configuration.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self::new(config.api_base()?)?)
    }

    /// Origin this client talks to.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Where the service serves the image attached to `entry`, if any.
    pub fn image_url(&self, entry: &CatalogEntry) -> Option<Url> {
        let image_ref = entry.image_ref.as_deref().filter(|value| !value.is_empty())?;
        self.endpoint(&[IMAGES, image_ref]).ok()
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiFailure> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiFailure::transport(format!("{} cannot be used as an origin", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn fetch_listings(&self, query: Option<&str>) -> Result<Vec<CatalogEntry>, ApiFailure> {
        let url = self.endpoint(&COLLECTION)?;
        let mut request = self.client.get(url).header(ACCEPT, "application/json");
        if let Some(query) = query.filter(|query| !query.is_empty()) {
            request = request.query(&[("q", query)]);
        }

        let (status, body) = execute(request, "fetch listings").await?;
        if !status.is_success() {
            return Err(failure_from_status(status, &body, "Failed to fetch listings"));
        }
        decode_listings(&body)
    }
}

#[async_trait]
impl CatalogSource for CatalogClient {
    async fn list_entries(&self) -> Result<Vec<CatalogEntry>, ApiFailure> {
        self.fetch_listings(None).await
    }

    async fn search_entries(&self, query: &str) -> Result<Vec<CatalogEntry>, ApiFailure> {
        self.fetch_listings(Some(query)).await
    }

    async fn create_entry(&self, entry: NewEntry) -> Result<CatalogEntry, ApiFailure> {
        let url = self.endpoint(&COLLECTION)?;
        let request = self.client.post(url).header(ACCEPT, "application/json");
        // reqwest sets the content type itself: JSON for `json`, and the
        // boundary-bearing multipart type for `multipart`.
        let request = match entry {
            NewEntry::Json(draft) => request.json(&draft),
            NewEntry::Multipart { draft, image } => {
                request.multipart(multipart_form(&draft, image)?)
            }
        };

        let (status, body) = execute(request, "create listing").await?;
        if !status.is_success() {
            return Err(failure_from_status(status, &body, "Failed to create listing"));
        }
        serde_json::from_slice(&body)
            .map_err(|err| ApiFailure::decode(format!("unexpected listing payload: {err}")))
    }

    async fn delete_entry(&self, id: &EntryId) -> Result<(), ApiFailure> {
        let [api, cars] = COLLECTION;
        let url = self.endpoint(&[api, cars, id.as_str()])?;

        let (status, body) = execute(self.client.delete(url), "delete listing").await?;
        if status == StatusCode::NOT_FOUND {
            return Err(make_failure(
                404,
                format!("Listing with ID {id} not found"),
                None,
            ));
        }
        if !status.is_success() {
            return Err(failure_from_status(status, &body, "Failed to delete listing"));
        }
        Ok(())
    }
}

async fn execute(request: RequestBuilder, action: &str) -> Result<(StatusCode, Vec<u8>), ApiFailure> {
    let response = request.send().await.map_err(|err| {
        debug!("{action} failed before a response arrived: {err}");
        ApiFailure::transport(format!("Network error: failed to {action} ({err})"))
    })?;

    let status = response.status();
    debug!("{action} answered {status}");
    let body = response.bytes().await.map_err(|err| {
        ApiFailure::transport(format!("Network error: failed to read {action} response ({err})"))
    })?;
    Ok((status, body.to_vec()))
}

fn failure_from_status(status: StatusCode, body: &[u8], fallback: &str) -> ApiFailure {
    let code = status.as_u16();
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(error) => {
            let (message, details) = match (error.message, error.detail) {
                (Some(message), detail) => (message, error.details.or(detail)),
                (None, Some(Value::String(detail))) => (detail, error.details),
                (None, detail) => (fallback.to_string(), error.details.or(detail)),
            };
            make_failure(code, message, details)
        }
        Err(_) => {
            debug!("undecodable error body for status {status}");
            let reason = status.canonical_reason().unwrap_or("Unknown Status");
            make_failure(code, format!("HTTP {code}: {reason}"), None)
        }
    }
}

fn decode_listings(body: &[u8]) -> Result<Vec<CatalogEntry>, ApiFailure> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice::<Option<Vec<CatalogEntry>>>(body)
        .map(Option::unwrap_or_default)
        .map_err(|err| ApiFailure::decode(format!("unexpected listings payload: {err}")))
}

fn multipart_form(draft: &EntryDraft, image: ImageUpload) -> Result<Form, ApiFailure> {
    let mut form = Form::new()
        .text("make", draft.make.clone())
        .text("model", draft.model.clone())
        .text("year", draft.year.to_string())
        .text("price", draft.price.to_string());
    if let Some(mileage) = draft.mileage {
        form = form.text("mileage", mileage.to_string());
    }
    if let Some(description) = &draft.description {
        form = form.text("description", description.clone());
    }

    let ImageUpload {
        file_name,
        content_type,
        bytes,
    } = image;
    let part = Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(&content_type)
        .map_err(|err| ApiFailure::transport(format!("invalid image type {content_type:?}: {err}")))?;
    Ok(form.part("image", part))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use anyhow::Result;
    use mockito::Matcher;
    use serde_json::json;

    fn client_for(server: &mockito::ServerGuard) -> Result<CatalogClient> {
        Ok(CatalogClient::new(Url::parse(&server.url())?)?)
    }

    fn civic() -> Value {
        json!({"id": "1", "make": "Honda", "model": "Civic", "year": 2020, "price": 18000})
    }

    fn sample_draft() -> EntryDraft {
        EntryDraft {
            make: "Toyota".to_string(),
            model: "Camry".to_string(),
            year: 2021,
            price: 24000.0,
            mileage: Some(12000),
            description: None,
        }
    }

    #[tokio::test]
    async fn lists_entries() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/cars")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!([civic()]).to_string())
            .create_async()
            .await;

        let entries = client_for(&server)?.list_entries().await?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].make, "Honda");
        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn null_body_is_an_empty_list() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/cars")
            .with_status(200)
            .with_body("null")
            .create_async()
            .await;

        assert!(client_for(&server)?.list_entries().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn malformed_success_body_is_a_decode_failure() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/cars")
            .with_status(200)
            .with_body(r#"{"cars": []}"#)
            .create_async()
            .await;

        let failure = client_for(&server)?
            .list_entries()
            .await
            .expect_err("object body must not decode as a list");
        assert_eq!(failure.kind, FailureKind::Decode);
        assert_eq!(failure.status, 0);
        Ok(())
    }

    #[tokio::test]
    async fn search_sends_query_parameter() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/cars")
            .match_query(Matcher::UrlEncoded("q".into(), "civic".into()))
            .with_status(200)
            .with_body(json!([civic()]).to_string())
            .create_async()
            .await;

        let entries = client_for(&server)?.search_entries("civic").await?;
        assert_eq!(entries[0].model, "Civic");
        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn structured_error_body_is_surfaced() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/cars")
            .with_status(500)
            .with_body(
                json!({"error": true, "message": "Error fetching cars: db down", "status_code": 500})
                    .to_string(),
            )
            .create_async()
            .await;

        let failure = client_for(&server)?
            .list_entries()
            .await
            .expect_err("500 must fail");
        assert_eq!(failure.status, 500);
        assert_eq!(failure.kind, FailureKind::ServerError);
        assert_eq!(failure.message, "Error fetching cars: db down");
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_error_body_uses_status_text() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/cars")
            .with_status(502)
            .with_body("<html>upstream timed out</html>")
            .create_async()
            .await;

        let failure = client_for(&server)?
            .list_entries()
            .await
            .expect_err("502 must fail");
        assert_eq!(failure.message, "HTTP 502: Bad Gateway");
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_failure() -> Result<()> {
        let client = CatalogClient::new(Url::parse("http://127.0.0.1:1")?)?;
        let failure = client
            .list_entries()
            .await
            .expect_err("nothing listens on port 1");
        assert_eq!(failure.status, 0);
        assert!(failure.is_transport());
        Ok(())
    }

    #[tokio::test]
    async fn lookup_by_id_filters_the_full_list() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/cars")
            .with_status(200)
            .with_body(
                json!([civic(), {"id": "2", "make": "Audi", "model": "A4", "year": 2019, "price": 21000}])
                    .to_string(),
            )
            .expect(2)
            .create_async()
            .await;

        let client = client_for(&server)?;
        let found = client.get_entry_by_id(&EntryId::from("2")).await?;
        assert_eq!(found.map(|entry| entry.model), Some("A4".to_string()));
        assert!(client.get_entry_by_id(&EntryId::from("99")).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn creates_from_json_draft() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/cars")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({
                "make": "Toyota", "model": "Camry", "year": 2021, "price": 24000.0, "mileage": 12000
            })))
            .with_status(201)
            .with_body(
                json!({"id": "abc", "make": "Toyota", "model": "Camry", "year": 2021, "price": 24000.0, "mileage": 12000})
                    .to_string(),
            )
            .create_async()
            .await;

        let created = client_for(&server)?
            .create_entry(NewEntry::Json(sample_draft()))
            .await?;
        assert_eq!(created.id.as_str(), "abc");
        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn rejected_create_carries_validation_details() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let detail = json!([
            {"loc": ["body", "year"], "msg": "ensure this value is greater than or equal to 1900"}
        ]);
        server
            .mock("POST", "/api/cars")
            .with_status(422)
            .with_body(json!({"detail": detail}).to_string())
            .create_async()
            .await;

        let failure = client_for(&server)?
            .create_entry(NewEntry::Json(sample_draft()))
            .await
            .expect_err("422 must fail");
        assert_eq!(failure.kind, FailureKind::ClientRejected);
        assert_eq!(failure.status, 422);
        assert_eq!(failure.message, "Failed to create listing");
        assert_eq!(failure.details, Some(detail));
        Ok(())
    }

    #[tokio::test]
    async fn malformed_created_listing_is_a_decode_failure() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/cars")
            .with_status(201)
            .with_body(r#"{"created": true}"#)
            .create_async()
            .await;

        let failure = client_for(&server)?
            .create_entry(NewEntry::Json(sample_draft()))
            .await
            .expect_err("body without listing fields must not decode");
        assert_eq!(failure.kind, FailureKind::Decode);
        assert_eq!(failure.status, 0);
        Ok(())
    }

    #[tokio::test]
    async fn creates_from_multipart_with_image() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/cars")
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/form-data; boundary=".into()),
            )
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="make""#.into()),
                Matcher::Regex(r#"filename="camry.png""#.into()),
            ]))
            .with_status(201)
            .with_body(
                json!({"id": "img1", "make": "Toyota", "model": "Camry", "year": 2021, "price": 24000.0, "image_path": "f00.png"})
                    .to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server)?;
        let entry = NewEntry::from_parts(
            sample_draft(),
            Some(ImageUpload {
                file_name: "camry.png".to_string(),
                content_type: "image/png".to_string(),
                bytes: vec![0x89, b'P', b'N', b'G'],
            }),
        );
        let created = client.create_entry(entry).await?;
        mock.assert_async().await;

        let image = client.image_url(&created).map(|url| url.to_string());
        assert_eq!(image, Some(format!("{}/images/f00.png", server.url())));
        Ok(())
    }

    #[tokio::test]
    async fn delete_of_missing_entry_is_not_found() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/api/cars/ghost")
            .with_status(404)
            .with_body(json!({"error": true, "message": "Car with ID ghost not found"}).to_string())
            .create_async()
            .await;

        let failure = client_for(&server)?
            .delete_entry(&EntryId::from("ghost"))
            .await
            .expect_err("missing id must fail");
        assert!(failure.is_not_found());
        assert_eq!(failure.kind, FailureKind::NotFound);
        assert!(failure.message.contains("ghost"));
        Ok(())
    }

    #[tokio::test]
    async fn delete_other_failures_are_generic() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/api/cars/not-an-object-id")
            .with_status(400)
            .with_body(json!({"detail": "Invalid car ID format: not-an-object-id"}).to_string())
            .create_async()
            .await;
        server
            .mock("DELETE", "/api/cars/1")
            .with_status(204)
            .create_async()
            .await;

        let client = client_for(&server)?;
        let failure = client
            .delete_entry(&EntryId::from("not-an-object-id"))
            .await
            .expect_err("400 must fail");
        assert_eq!(failure.kind, FailureKind::ClientRejected);
        assert_eq!(failure.message, "Invalid car ID format: not-an-object-id");

        client.delete_entry(&EntryId::from("1")).await?;
        Ok(())
    }

    #[test]
    fn image_url_requires_a_reference() -> Result<()> {
        let client = CatalogClient::new(Url::parse("http://localhost:8000/")?)?;
        let mut entry: CatalogEntry = serde_json::from_value(civic())?;
        assert!(client.image_url(&entry).is_none());
        entry.image_ref = Some("x.jpg".to_string());
        assert_eq!(
            client.image_url(&entry).map(|url| url.to_string()),
            Some("http://localhost:8000/images/x.jpg".to_string())
        );
        Ok(())
    }
}
