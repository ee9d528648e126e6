//! List endpoints: paged views of blocked, allowed and known IPs.

use crate::RegistryClient;
use banshare_core::{PageRequest, PageResponse, RecordView, Result, ShareError, StatusKind};
use tracing::debug;

/// List API endpoints
pub struct ListApi<'a> {
    client: &'a RegistryClient,
}

impl<'a> ListApi<'a> {
    pub(crate) const fn new(client: &'a RegistryClient) -> Self {
        Self { client }
    }

    /// One page of records with the given status.
    pub async fn page(&self, status: StatusKind, request: &PageRequest) -> Result<PageResponse> {
        let mut params = vec![
            ("page", request.page.to_string()),
            ("page_size", request.page_size.to_string()),
        ];
        if let Some(search) = &request.search_ip {
            params.push(("search_ip", search.clone()));
        }
        self.client.get_with_query(endpoint(status), &params).await
    }

    /// One page of blocked IPs
    pub async fn blocked(&self, request: &PageRequest) -> Result<PageResponse> {
        self.page(StatusKind::Blocked, request).await
    }

    /// One page of allowed IPs
    pub async fn allowed(&self, request: &PageRequest) -> Result<PageResponse> {
        self.page(StatusKind::Allowed, request).await
    }

    /// One page of known IPs
    pub async fn known(&self, request: &PageRequest) -> Result<PageResponse> {
        self.page(StatusKind::Known, request).await
    }

    /// Drain every page for a status.
    ///
    /// Stops once `total` items were collected or the registry returns an
    /// empty page. Any failed page fails the whole fetch.
    pub async fn fetch_all(&self, status: StatusKind, page_size: u32) -> Result<Vec<RecordView>> {
        if page_size == 0 {
            return Err(ShareError::Config("page_size must be positive".into()));
        }

        let mut request = PageRequest::first(page_size);
        let mut items = Vec::new();
        loop {
            let page = self.page(status, &request).await?;
            let received = page.items.len();
            items.extend(page.items);
            debug!(
                %status,
                page = request.page,
                received,
                collected = items.len(),
                total = page.total,
                "fetched page"
            );

            if received == 0 || items.len() as u64 >= page.total {
                return Ok(items);
            }
            request = request.next();
        }
    }
}

const fn endpoint(status: StatusKind) -> &'static str {
    match status {
        StatusKind::Blocked => "/get_ips",
        StatusKind::Allowed => "/get_allowed_ips",
        StatusKind::Known => "/get_known_ips",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RetryConfig;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn item(ip: &str) -> serde_json::Value {
        serde_json::json!({
            "ip": ip,
            "status": "blocked",
            "reported_by": "edge@web1",
            "blocked_until": "2025-03-01T12:03:00Z",
            "block_count": 1
        })
    }

    fn client(server: &MockServer) -> RegistryClient {
        RegistryClient::builder(&server.uri(), "t")
            .retry(RetryConfig::none())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_all_drains_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/get_ips"))
            .and(query_param("page", "1"))
            .and(query_param("page_size", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [item("10.0.0.1"), item("10.0.0.2")],
                "total": 3
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/get_ips"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [item("10.0.0.3")],
                "total": 3
            })))
            .expect(1)
            .mount(&server)
            .await;

        let items = client(&server)
            .list()
            .fetch_all(StatusKind::Blocked, 2)
            .await
            .unwrap();
        let ips: Vec<_> = items.iter().map(|r| r.ip.as_str()).collect();
        assert_eq!(ips, ["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    }

    #[tokio::test]
    async fn test_fetch_all_stops_on_empty_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/get_allowed_ips"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [],
                "total": 10
            })))
            .expect(1)
            .mount(&server)
            .await;

        let items = client(&server)
            .list()
            .fetch_all(StatusKind::Allowed, 100)
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_missing_total_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/get_known_ips"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": []
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .list()
            .known(&PageRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_search_filter_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/get_ips"))
            .and(query_param("search_ip", "192.168."))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [item("192.168.0.7")],
                "total": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = PageRequest {
            search_ip: Some("192.168.".into()),
            ..PageRequest::default()
        };
        let page = client(&server).list().blocked(&request).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].ip, "192.168.0.7");
    }

    #[tokio::test]
    async fn test_zero_page_size_rejected() {
        let server = MockServer::start().await;
        let err = client(&server)
            .list()
            .fetch_all(StatusKind::Blocked, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::Config(_)));
    }
}
