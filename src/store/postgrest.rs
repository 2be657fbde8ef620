/// PostgREST client for the hosted project's tables
use super::{DataStore, NewPurchaseLink, PurchaseLink, StoreError, StoreResult};
use crate::{
    account::{Account, ProfileFlags},
    catalog::{Category, Course, CoursePatch, CourseQuery, NewCourse},
    ledger::{NewTransaction, Transaction, TransactionStatus},
    metrics,
    provider::AuthProvider,
};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

const COURSE_COLUMNS: &str = "id,title,description,instructor,price,image_url,duration,level,students,rating,category_id,created_at,categories(name)";
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Where the bearer token for each request comes from
#[derive(Clone)]
pub enum BearerSource {
    /// Server-side access that bypasses row-level policies
    ServiceRole(String),
    /// Signed-in user; falls back to the anon key when signed out
    Session {
        anon_key: String,
        provider: Arc<dyn AuthProvider>,
    },
}

#[derive(Debug, Default, Deserialize)]
struct PostgrestErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CategoryName {
    name: String,
}

/// Course row with the embedded category
#[derive(Debug, Deserialize)]
struct CourseRow {
    #[serde(flatten)]
    course: Course,
    #[serde(default)]
    categories: Option<CategoryName>,
}

impl From<CourseRow> for Course {
    fn from(row: CourseRow) -> Self {
        let mut course = row.course;
        course.category = row.categories.map(|c| c.name);
        course
    }
}

/// Store backed by the hosted PostgREST endpoint
#[derive(Clone)]
pub struct PostgrestStore {
    client: Client,
    rest_url: String,
    bearer: BearerSource,
}

impl PostgrestStore {
    pub fn new(project_url: &str, bearer: BearerSource, timeout: Duration) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Backend(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", project_url.trim_end_matches('/')),
            bearer,
        })
    }

    async fn request(&self, method: Method, path_and_query: &str) -> RequestBuilder {
        let (api_key, token) = match &self.bearer {
            BearerSource::ServiceRole(key) => (key.clone(), key.clone()),
            BearerSource::Session { anon_key, provider } => {
                let token = match provider.current_session().await {
                    Ok(Some(session)) => session.access_token,
                    _ => anon_key.clone(),
                };
                (anon_key.clone(), token)
            }
        };

        self.client
            .request(method, format!("{}/{}", self.rest_url, path_and_query))
            .header("apikey", api_key)
            .bearer_auth(token)
    }

    async fn send(&self, table: &str, operation: &str, builder: RequestBuilder) -> StoreResult<Response> {
        let started = Instant::now();
        let result = builder.send().await;
        metrics::record_backend_request(operation, table, started.elapsed().as_secs_f64());

        let response = result.map_err(transport_error)?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body: PostgrestErrorBody = response.json().await.unwrap_or_default();
        Err(map_error(status, &body, table))
    }

    async fn fetch_list<T: DeserializeOwned>(&self, table: &str, query: &str) -> StoreResult<Vec<T>> {
        let builder = self.request(Method::GET, &format!("{}?{}", table, query)).await;
        let response = self.send(table, "select", builder).await?;
        decode(response).await
    }

    async fn fetch_single<T: DeserializeOwned>(&self, table: &str, query: &str) -> StoreResult<T> {
        let builder = self
            .request(Method::GET, &format!("{}?{}", table, query))
            .await
            .header("Accept", SINGLE_OBJECT);
        let response = self.send(table, "select", builder).await?;
        decode(response).await
    }

    async fn write_single<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        table: &str,
        query: &str,
        body: &B,
    ) -> StoreResult<T> {
        let path = if query.is_empty() {
            table.to_string()
        } else {
            format!("{}?{}", table, query)
        };
        let operation = if method == Method::POST { "insert" } else { "update" };
        let builder = self
            .request(method, &path)
            .await
            .header("Prefer", "return=representation")
            .header("Accept", SINGLE_OBJECT)
            .json(body);
        let response = self.send(table, operation, builder).await?;
        decode(response).await
    }
}

fn transport_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        StoreError::Transient(err.to_string())
    } else {
        StoreError::Backend(err.to_string())
    }
}

fn map_error(status: StatusCode, body: &PostgrestErrorBody, table: &str) -> StoreError {
    let message = body
        .message
        .clone()
        .or_else(|| body.details.clone())
        .unwrap_or_else(|| status.to_string());

    match body.code.as_deref() {
        Some("PGRST116") => return StoreError::NotFound(format!("{}: {}", table, message)),
        Some("23505") => return StoreError::Conflict(format!("{}: {}", table, message)),
        Some("42501") => return StoreError::Unauthorized(message),
        _ => {}
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Unauthorized(message),
        StatusCode::NOT_ACCEPTABLE | StatusCode::NOT_FOUND => {
            StoreError::NotFound(format!("{}: {}", table, message))
        }
        StatusCode::CONFLICT => StoreError::Conflict(format!("{}: {}", table, message)),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => StoreError::Transient(message),
        s if s.is_server_error() => StoreError::Transient(message),
        _ => StoreError::Backend(message),
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> StoreResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| StoreError::Backend(format!("Malformed response: {}", e)))
}

/// Total from a `Content-Range: 0-5/42` header
fn parse_content_range(value: Option<&str>) -> Option<u64> {
    value?.rsplit('/').next()?.parse().ok()
}

fn in_list(ids: &[Uuid]) -> String {
    let joined: Vec<String> = ids.iter().map(Uuid::to_string).collect();
    format!("in.({})", joined.join(","))
}

#[async_trait]
impl DataStore for PostgrestStore {
    async fn get_profile(&self, id: Uuid) -> StoreResult<Account> {
        self.fetch_single("profiles", &format!("select=*&id=eq.{}", id)).await
    }

    async fn get_profiles(&self, ids: &[Uuid]) -> StoreResult<Vec<Account>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch_list("profiles", &format!("select=*&id={}", in_list(ids)))
            .await
    }

    async fn list_learners(&self) -> StoreResult<Vec<Account>> {
        self.fetch_list("profiles", "select=*&role=eq.user&order=name.asc")
            .await
    }

    async fn update_profile_flags(&self, id: Uuid, flags: ProfileFlags) -> StoreResult<Account> {
        self.write_single(Method::PATCH, "profiles", &format!("id=eq.{}", id), &flags)
            .await
    }

    async fn list_courses(&self, query: &CourseQuery) -> StoreResult<(Vec<Course>, u64)> {
        let mut filter = String::new();
        if let Some(name) = &query.category {
            match self.find_category_by_name(name).await? {
                Some(category) => filter = format!("&category_id=eq.{}", category.id),
                None => return Ok((Vec::new(), 0)),
            }
        }

        let path = format!(
            "courses?select={}&order=created_at.desc&offset={}&limit={}{}",
            COURSE_COLUMNS, query.offset, query.limit, filter
        );
        let builder = self
            .request(Method::GET, &path)
            .await
            .header("Prefer", "count=exact");
        let response = self.send("courses", "select", builder).await?;

        let total = parse_content_range(
            response
                .headers()
                .get("content-range")
                .and_then(|v| v.to_str().ok()),
        );
        let rows: Vec<CourseRow> = decode(response).await?;
        let courses: Vec<Course> = rows.into_iter().map(Course::from).collect();
        let total = total.unwrap_or(query.offset as u64 + courses.len() as u64);

        Ok((courses, total))
    }

    async fn get_course(&self, id: Uuid) -> StoreResult<Course> {
        let row: CourseRow = self
            .fetch_single("courses", &format!("select={}&id=eq.{}", COURSE_COLUMNS, id))
            .await?;
        Ok(row.into())
    }

    async fn insert_course(&self, course: NewCourse) -> StoreResult<Course> {
        let row: CourseRow = self
            .write_single(
                Method::POST,
                "courses",
                &format!("select={}", COURSE_COLUMNS),
                &course,
            )
            .await?;
        Ok(row.into())
    }

    async fn update_course(&self, id: Uuid, patch: &CoursePatch) -> StoreResult<Course> {
        let row: CourseRow = self
            .write_single(
                Method::PATCH,
                "courses",
                &format!("id=eq.{}&select={}", id, COURSE_COLUMNS),
                patch,
            )
            .await?;
        Ok(row.into())
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        self.fetch_list("categories", "select=id,name&order=name.asc")
            .await
    }

    async fn find_category_by_name(&self, name: &str) -> StoreResult<Option<Category>> {
        let mut rows: Vec<Category> = self
            .fetch_list(
                "categories",
                &format!("select=id,name&name=eq.{}&limit=1", urlencoding::encode(name)),
            )
            .await?;
        Ok(rows.pop())
    }

    async fn insert_category(&self, name: &str) -> StoreResult<Category> {
        self.write_single(Method::POST, "categories", "select=id,name", &json!({ "name": name }))
            .await
    }

    async fn insert_transaction(&self, tx: NewTransaction) -> StoreResult<Transaction> {
        self.write_single(Method::POST, "transactions", "select=*", &tx)
            .await
    }

    async fn list_transactions(&self, user_id: Option<Uuid>) -> StoreResult<Vec<Transaction>> {
        let query = match user_id {
            Some(id) => format!("select=*&user_id=eq.{}&order=created_at.desc", id),
            None => "select=*&order=created_at.desc".to_string(),
        };
        self.fetch_list("transactions", &query).await
    }

    async fn get_transaction(&self, id: Uuid) -> StoreResult<Transaction> {
        self.fetch_single("transactions", &format!("select=*&id=eq.{}", id))
            .await
    }

    async fn mark_disputed(&self, id: Uuid, reason: &str) -> StoreResult<Transaction> {
        let body = json!({
            "status": TransactionStatus::Disputed.as_str(),
            "dispute_reason": reason,
        });
        self.write_single(
            Method::PATCH,
            "transactions",
            &format!("id=eq.{}&select=*", id),
            &body,
        )
        .await
    }

    async fn insert_purchase_link(&self, link: NewPurchaseLink) -> StoreResult<PurchaseLink> {
        let builder = self
            .request(Method::POST, "user_purchased_courses")
            .await
            .header("Prefer", "return=minimal")
            .json(&link);
        self.send("user_purchased_courses", "insert", builder).await?;
        Ok(link)
    }

    async fn list_purchase_links(&self, user_id: Uuid) -> StoreResult<Vec<PurchaseLink>> {
        self.fetch_list(
            "user_purchased_courses",
            &format!("select=user_id,course_id,transaction_id&user_id=eq.{}", user_id),
        )
        .await
    }

    async fn list_purchase_links_for(&self, user_ids: &[Uuid]) -> StoreResult<Vec<PurchaseLink>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch_list(
            "user_purchased_courses",
            &format!("select=user_id,course_id,transaction_id&user_id={}", in_list(user_ids)),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_range_parsing() {
        assert_eq!(parse_content_range(Some("0-5/42")), Some(42));
        assert_eq!(parse_content_range(Some("*/0")), Some(0));
        assert_eq!(parse_content_range(Some("0-5/*")), None);
        assert_eq!(parse_content_range(None), None);
    }

    #[test]
    fn test_error_classification() {
        let not_found = PostgrestErrorBody {
            code: Some("PGRST116".into()),
            message: Some("JSON object requested, multiple (or no) rows returned".into()),
            details: None,
        };
        assert!(matches!(
            map_error(StatusCode::NOT_ACCEPTABLE, &not_found, "profiles"),
            StoreError::NotFound(_)
        ));

        let duplicate = PostgrestErrorBody {
            code: Some("23505".into()),
            ..Default::default()
        };
        assert!(matches!(
            map_error(StatusCode::CONFLICT, &duplicate, "courses"),
            StoreError::Conflict(_)
        ));

        assert!(matches!(
            map_error(StatusCode::BAD_GATEWAY, &PostgrestErrorBody::default(), "courses"),
            StoreError::Transient(_)
        ));
        assert!(matches!(
            map_error(StatusCode::BAD_REQUEST, &PostgrestErrorBody::default(), "courses"),
            StoreError::Backend(_)
        ));
    }

    #[test]
    fn test_course_row_embeds_category() {
        let row: CourseRow = serde_json::from_value(json!({
            "id": "0b1a3b6e-6f0e-4f55-9a61-2a1d7f3c9e10",
            "title": "Rust",
            "description": null,
            "instructor": "Ferris",
            "price": "99.50",
            "image_url": null,
            "duration": "10 hours",
            "level": null,
            "students": 12,
            "rating": 4.8,
            "category_id": null,
            "created_at": "2024-05-01T10:00:00+00:00",
            "categories": null
        }))
        .unwrap();
        let course: Course = row.into();
        assert_eq!(course.category_name(), "Uncategorized");
        assert_eq!(course.price.cents(), 9_950);
        assert_eq!(course.level, crate::catalog::Level::Beginner);
    }
}
