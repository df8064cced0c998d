use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response, StatusCode};

use super::{Filter, Record, Repository, RepositoryError};

/// Shared HTTP client for the hosted backend's auto-generated REST layer.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

impl RestClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, RepositoryError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            let apikey = HeaderValue::from_str(key)
                .map_err(|err| RepositoryError::Unavailable(format!("invalid api key: {err}")))?;
            let bearer = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|err| RepositoryError::Unavailable(format!("invalid api key: {err}")))?;
            headers.insert("apikey", apikey);
            headers.insert(AUTHORIZATION, bearer);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| RepositoryError::Unavailable(err.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    pub fn repository<T: Record>(&self) -> RestRepository<T> {
        RestRepository {
            client: self.clone(),
            _record: PhantomData,
        }
    }
}

/// One backend table addressed through [`RestClient`].
#[derive(Debug, Clone)]
pub struct RestRepository<T> {
    client: RestClient,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> RestRepository<T> {
    fn url(&self) -> String {
        self.client.table_url(T::TABLE)
    }

    async fn rows(&self, request: RequestBuilder) -> Result<Vec<T>, RepositoryError> {
        let response = request.send().await.map_err(transport_error)?;
        let response = check_status(response).await?;
        response
            .json::<Vec<T>>()
            .await
            .map_err(|err| RepositoryError::Decode(err.to_string()))
    }
}

/// Query pairs in the backend's `column=eq.value` dialect.
pub(crate) fn filter_query(filter: &Filter) -> Vec<(String, String)> {
    filter
        .conditions()
        .iter()
        .map(|(column, value)| (column.to_string(), format!("eq.{value}")))
        .collect()
}

fn id_query(id: &str) -> (String, String) {
    ("id".to_string(), format!("eq.{id}"))
}

fn transport_error(err: reqwest::Error) -> RepositoryError {
    RepositoryError::Unavailable(err.to_string())
}

async fn check_status(response: Response) -> Result<Response, RepositoryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::CONFLICT => RepositoryError::Conflict,
        StatusCode::NOT_FOUND => RepositoryError::NotFound,
        status if status.is_server_error() => {
            RepositoryError::Unavailable(format!("{status}: {message}"))
        }
        status => RepositoryError::Rejected {
            status: status.as_u16(),
            message,
        },
    })
}

#[async_trait]
impl<T: Record> Repository<T> for RestRepository<T> {
    async fn insert(&self, record: T) -> Result<T, RepositoryError> {
        let request = self
            .client
            .http
            .post(self.url())
            .header("Prefer", "return=representation")
            .json(&record);
        self.rows(request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RepositoryError::Decode("insert returned no row".to_string()))
    }

    async fn fetch(&self, id: &str) -> Result<Option<T>, RepositoryError> {
        let request = self
            .client
            .http
            .get(self.url())
            .query(&[("select", "*"), ("limit", "1")])
            .query(&[id_query(id)]);
        Ok(self.rows(request).await?.into_iter().next())
    }

    async fn list(&self, filter: &Filter) -> Result<Vec<T>, RepositoryError> {
        let request = self
            .client
            .http
            .get(self.url())
            .query(&[("select", "*"), ("order", "created_at.desc.nullslast")])
            .query(&filter_query(filter));
        self.rows(request).await
    }

    async fn update_if(&self, record: T, expected: &Filter) -> Result<Option<T>, RepositoryError> {
        let request = self
            .client
            .http
            .patch(self.url())
            .header("Prefer", "return=representation")
            .query(&[id_query(record.id())])
            .query(&filter_query(expected))
            .json(&record);
        Ok(self.rows(request).await?.into_iter().next())
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        let request = self
            .client
            .http
            .delete(self.url())
            .header("Prefer", "return=representation")
            .query(&[id_query(id)]);
        Ok(!self.rows(request).await?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_conditions_use_eq_operator() {
        let filter = Filter::new().eq("status", "open").eq("subject", "Mathematics");
        assert_eq!(
            filter_query(&filter),
            vec![
                ("status".to_string(), "eq.open".to_string()),
                ("subject".to_string(), "eq.Mathematics".to_string()),
            ]
        );
    }

    #[test]
    fn table_url_joins_without_double_slash() {
        let client = RestClient::new(
            "https://demo.supabase.co/rest/v1/",
            Some("anon"),
            Duration::from_secs(5),
        )
        .expect("client builds");
        assert_eq!(
            client.table_url("invoices"),
            "https://demo.supabase.co/rest/v1/invoices"
        );
    }
}
