use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{decode_json, Session};
use crate::error::{Error, Result};

/// Superset caps page sizes at 100 by default.
const PAGE_SIZE: usize = 100;

/// Stop paging after this many pages, in case the server ignores `page`.
const MAX_PAGES: usize = 100;

/// The resource types we know how to provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Role,
    Database,
    Dataset,
    Dashboard,
}

impl ResourceKind {
    /// List and create both live at this path.
    pub fn endpoint(self) -> &'static str {
        match self {
            ResourceKind::Role => "/api/v1/security/roles/",
            ResourceKind::Database => "/api/v1/database/",
            ResourceKind::Dataset => "/api/v1/dataset/",
            ResourceKind::Dashboard => "/api/v1/dashboard/",
        }
    }

    /// The field a record is identified by, by humans at least.
    pub fn name_field(self) -> &'static str {
        match self {
            ResourceKind::Role => "name",
            ResourceKind::Database => "database_name",
            ResourceKind::Dataset => "table_name",
            ResourceKind::Dashboard => "dashboard_title",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Role => "role",
            ResourceKind::Database => "database connection",
            ResourceKind::Dataset => "dataset",
            ResourceKind::Dashboard => "dashboard",
        };
        f.write_str(name)
    }
}

/// What we want to exist: a named record of some kind, and the body
/// to create it with if it doesn't.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSpec {
    pub kind: ResourceKind,
    pub name: String,
    pub payload: Value,
}

impl ResourceSpec {
    /// The name always ends up in the payload's name field, so the record
    /// we create is the one a later lookup will find.
    pub fn new(kind: ResourceKind, name: impl Into<String>, payload: Value) -> Self {
        let name = name.into();
        let mut payload = match payload {
            Value::Object(map) => Value::Object(map),
            _ => Value::Object(Default::default()),
        };
        payload[kind.name_field()] = Value::String(name.clone());
        Self {
            kind,
            name,
            payload,
        }
    }

    /// Sets (or replaces) a top-level payload field.
    pub fn with_field(mut self, field: &str, value: Value) -> Self {
        self.payload[field] = value;
        self
    }
}

/// A record that exists on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    pub id: i64,
    /// Only dashboards carry one we care about.
    pub uuid: Option<Uuid>,
    /// Whether this run created it.
    pub created: bool,
}

#[derive(Deserialize)]
struct ListPage {
    #[serde(default)]
    count: Option<usize>,
    #[serde(default)]
    result: Vec<Value>,
}

#[derive(Deserialize)]
struct CreatedRecord {
    id: i64,
    #[serde(default)]
    result: Value,
}

#[derive(Deserialize)]
struct RecordEnvelope {
    result: Value,
}

fn record_uuid(record: &Value) -> Option<Uuid> {
    record.get("uuid")?.as_str()?.parse().ok()
}

/// Fetches every record of `kind`, following Superset's rison paging.
pub async fn list_all(session: &Session, kind: ResourceKind) -> Result<Vec<Value>> {
    let mut records = Vec::new();

    for page in 0..MAX_PAGES {
        let query = format!("(page:{page},page_size:{PAGE_SIZE})");
        let response = session.get_query(kind.endpoint(), &[("q", query)]).await?;
        let listing: ListPage = decode_json(response, kind.endpoint()).await?;

        let fetched = listing.result.len();
        records.extend(listing.result);
        let all_seen = listing.count.is_some_and(|count| records.len() >= count);
        if fetched < PAGE_SIZE || all_seen {
            break;
        }
    }

    debug!("listed {} {kind} record(s)", records.len());
    Ok(records)
}

/// The first listed record whose name matches, if there is one.
pub async fn find_existing(session: &Session, spec: &ResourceSpec) -> Result<Option<Provisioned>> {
    let records = list_all(session, spec.kind).await?;
    let field = spec.kind.name_field();

    let found = records
        .iter()
        .find(|record| record.get(field).and_then(Value::as_str) == Some(spec.name.as_str()));
    let Some(record) = found else {
        return Ok(None);
    };

    let id = record
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::UnexpectedResponse {
            path: spec.kind.endpoint().to_string(),
            reason: format!("{} {:?} has no numeric id", spec.kind, spec.name),
        })?;
    Ok(Some(Provisioned {
        id,
        uuid: record_uuid(record),
        created: false,
    }))
}

/// Makes sure exactly one record named `spec.name` exists, creating it if needed.
pub async fn ensure(session: &mut Session, spec: &ResourceSpec) -> Result<Provisioned> {
    if let Some(existing) = find_existing(session, spec).await? {
        info!("{} {:?} already exists with id {}", spec.kind, spec.name, existing.id);
        return Ok(existing);
    }

    session.refresh_csrf_token().await;
    let response = session.post_json(spec.kind.endpoint(), &spec.payload).await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::CreationFailed {
            kind: spec.kind,
            name: spec.name.clone(),
            status: status.as_u16(),
            body,
        });
    }

    let created: CreatedRecord = response
        .json()
        .await
        .map_err(|error| Error::UnexpectedResponse {
            path: spec.kind.endpoint().to_string(),
            reason: format!("create response has no id: {error}"),
        })?;
    info!("created {} {:?} with id {}", spec.kind, spec.name, created.id);
    Ok(Provisioned {
        id: created.id,
        uuid: record_uuid(&created.result),
        created: true,
    })
}

/// Looks up a dashboard's UUID, which the list and create endpoints
/// don't always return.
pub async fn dashboard_uuid(session: &Session, id: i64) -> Result<Uuid> {
    let path = format!("{}{id}", ResourceKind::Dashboard.endpoint());
    let response = session.get(&path).await?;
    let envelope: RecordEnvelope = decode_json(response, &path).await?;

    record_uuid(&envelope.result).ok_or_else(|| Error::UnexpectedResponse {
        path,
        reason: "dashboard has no uuid".to_string(),
    })
}

/// Like [`ensure`], then fills in the UUID. A UUID lookup failure only
/// leaves `uuid` unset.
pub async fn ensure_dashboard(session: &mut Session, spec: &ResourceSpec) -> Result<Provisioned> {
    let mut dashboard = ensure(session, spec).await?;
    if dashboard.uuid.is_none() {
        match dashboard_uuid(session, dashboard.id).await {
            Ok(uuid) => dashboard.uuid = Some(uuid),
            Err(error) => warn!("unable to get UUID of dashboard {}: {error}", dashboard.id),
        }
    }
    Ok(dashboard)
}

/// One line of `dashboards` output.
#[derive(Debug, Clone, Deserialize)]
pub struct DashboardSummary {
    pub id: i64,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub dashboard_title: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    /// Older dashboards can have this unset.
    #[serde(default)]
    pub published: Option<bool>,
}

pub async fn list_dashboards(session: &Session) -> Result<Vec<DashboardSummary>> {
    list_all(session, ResourceKind::Dashboard)
        .await?
        .into_iter()
        .map(|record| {
            serde_json::from_value(record).map_err(|error| Error::UnexpectedResponse {
                path: ResourceKind::Dashboard.endpoint().to_string(),
                reason: error.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{build_client, LoginMethod};
    use serde_json::json;
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DASHBOARD_UUID: &str = "df2a444a-8df2-43ae-bae6-d61c4a717956";

    fn session(server: &MockServer) -> Session {
        let client = build_client(Duration::from_secs(5)).unwrap();
        Session::new(
            client,
            Url::parse(&server.uri()).unwrap(),
            Some("token".to_string()),
            LoginMethod::Token,
        )
    }

    fn brand_dashboard() -> ResourceSpec {
        ResourceSpec::new(
            ResourceKind::Dashboard,
            "Brand Dashboard",
            json!({ "slug": "brand-dashboard", "published": true }),
        )
    }

    fn listing(records: Value) -> ResponseTemplate {
        let count = records.as_array().map(Vec::len).unwrap_or_default();
        ResponseTemplate::new(200).set_body_json(json!({ "count": count, "result": records }))
    }

    #[test]
    fn test_spec_payload_carries_name() {
        let spec = brand_dashboard();
        assert_eq!(spec.payload["dashboard_title"], "Brand Dashboard");
        assert_eq!(spec.payload["slug"], "brand-dashboard");

        let spec = ResourceSpec::new(ResourceKind::Role, "Guest", Value::Null);
        assert_eq!(spec.payload, json!({ "name": "Guest" }));
    }

    #[tokio::test]
    async fn test_existing_dashboard_is_reused() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/dashboard/"))
            .respond_with(listing(json!([
                { "id": 3, "dashboard_title": "Sales", "uuid": "00000000-0000-0000-0000-000000000003" },
                { "id": 7, "dashboard_title": "Brand Dashboard", "uuid": DASHBOARD_UUID },
                { "id": 9, "dashboard_title": "Brand Dashboard" }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/dashboard/"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let mut session = session(&server);
        let dashboard = ensure_dashboard(&mut session, &brand_dashboard()).await.unwrap();
        assert_eq!(
            dashboard,
            Provisioned {
                id: 7,
                uuid: Some(DASHBOARD_UUID.parse().unwrap()),
                created: false,
            }
        );
    }

    #[tokio::test]
    async fn test_second_run_finds_what_the_first_created() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/security/roles/"))
            .respond_with(listing(json!([{ "id": 1, "name": "Admin" }])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/security/roles/"))
            .respond_with(listing(json!([
                { "id": 1, "name": "Admin" },
                { "id": 6, "name": "Guest" }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/security/roles/"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({ "id": 6, "result": { "name": "Guest" } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut session = session(&server);
        let spec = ResourceSpec::new(ResourceKind::Role, "Guest", json!({}));
        let first = ensure(&mut session, &spec).await.unwrap();
        let second = ensure(&mut session, &spec).await.unwrap();

        assert_eq!(first.id, 6);
        assert!(first.created);
        assert_eq!(second.id, 6);
        assert!(!second.created);
    }

    #[tokio::test]
    async fn test_created_dashboard_gets_uuid_from_detail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/dashboard/"))
            .respond_with(listing(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/dashboard/"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 12,
                "result": { "dashboard_title": "Brand Dashboard" }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/dashboard/12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": { "id": 12, "uuid": DASHBOARD_UUID }
            })))
            .mount(&server)
            .await;

        let mut session = session(&server);
        let dashboard = ensure_dashboard(&mut session, &brand_dashboard()).await.unwrap();
        assert_eq!(dashboard.id, 12);
        assert!(dashboard.created);
        assert_eq!(dashboard.uuid, Some(DASHBOARD_UUID.parse().unwrap()));
    }

    #[tokio::test]
    async fn test_create_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/dataset/"))
            .respond_with(listing(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/dataset/"))
            .respond_with(ResponseTemplate::new(422).set_body_string("table brands does not exist"))
            .mount(&server)
            .await;

        let mut session = session(&server);
        let spec = ResourceSpec::new(ResourceKind::Dataset, "brands", json!({ "schema": "default" }));
        let err = ensure(&mut session, &spec).await.unwrap_err();
        assert!(!err.is_fatal());
        let Error::CreationFailed { kind, status, body, .. } = err else {
            panic!("expected a creation failure, got {err:?}");
        };
        assert_eq!(kind, ResourceKind::Dataset);
        assert_eq!(status, 422);
        assert_eq!(body, "table brands does not exist");
    }

    #[tokio::test]
    async fn test_paging_continues_until_count() {
        let server = MockServer::start().await;
        let first_page: Vec<Value> = (0..PAGE_SIZE as i64)
            .map(|id| json!({ "id": id, "database_name": format!("db-{id}") }))
            .collect();
        Mock::given(method("GET"))
            .and(path("/api/v1/database/"))
            .and(query_param("q", "(page:0,page_size:100)"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": PAGE_SIZE + 1,
                "result": first_page
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/database/"))
            .and(query_param("q", "(page:1,page_size:100)"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": PAGE_SIZE + 1,
                "result": [{ "id": 500, "database_name": "MongoDB via Trino" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = session(&server);
        let spec = ResourceSpec::new(ResourceKind::Database, "MongoDB via Trino", json!({}));
        let found = find_existing(&session, &spec).await.unwrap().unwrap();
        assert_eq!(found.id, 500);
    }

    #[tokio::test]
    async fn test_list_dashboards() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/dashboard/"))
            .respond_with(listing(json!([
                { "id": 1, "uuid": DASHBOARD_UUID, "dashboard_title": "Brand Dashboard", "slug": "brand-dashboard", "published": true },
                { "id": 2, "dashboard_title": "Draft" },
                { "id": 3, "dashboard_title": "Legacy", "published": null }
            ])))
            .mount(&server)
            .await;

        let dashboards = list_dashboards(&session(&server)).await.unwrap();
        assert_eq!(dashboards.len(), 3);
        assert_eq!(dashboards[0].slug.as_deref(), Some("brand-dashboard"));
        assert_eq!(dashboards[0].published, Some(true));
        assert_eq!(dashboards[1].uuid, None);
        assert_eq!(dashboards[1].published, None);
        assert_eq!(dashboards[2].published, None);
    }
}
