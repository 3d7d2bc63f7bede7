use log::debug;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use url::Url;

use crate::auth::Token;
use crate::error::{PipeLensError, Result};

use super::super::types::Paginated;

/// Largest page Bitbucket serves for pipeline resources.
pub(in crate::providers::bitbucket) const MAX_PAGE_LEN: usize = 100;

pub struct BitbucketClient {
    client: Client,
    pipelines_url: Url,
    token: Option<Token>,
}

impl BitbucketClient {
    pub fn new(base_url: &str, workspace: &str, repo: &str, token: Option<Token>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("PipeLens/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipeLensError::Config(format!("Failed to create HTTP client: {e}")))?;

        let mut pipelines_url = Url::parse(base_url)
            .map_err(|e| PipeLensError::Config(format!("Invalid base URL: {e}")))?;
        pipelines_url
            .path_segments_mut()
            .map_err(|()| PipeLensError::Config(format!("Invalid base URL: {base_url}")))?
            .pop_if_empty()
            .extend(["repositories", workspace, repo, "pipelines", ""]);

        Ok(Self {
            client,
            pipelines_url,
            token,
        })
    }

    pub fn auth_request(&self, request: RequestBuilder) -> RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token.as_str())
        } else {
            request
        }
    }

    /// URL below `.../pipelines/`, one path segment per entry. Segments are
    /// percent-encoded, so braces in UUIDs are safe.
    pub(in crate::providers::bitbucket) fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.pipelines_url.clone();
        url.path_segments_mut()
            .map_err(|()| PipeLensError::Config("Pipelines URL cannot have a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends an authenticated GET and returns the raw response, whatever its
    /// status.
    pub(in crate::providers::bitbucket) async fn send(
        &self,
        request: RequestBuilder,
    ) -> Result<Response> {
        Ok(self.auth_request(request).send().await?)
    }

    pub(in crate::providers::bitbucket) async fn get_json<T>(&self, url: Url) -> Result<T>
    where
        T: DeserializeOwned,
    {
        debug!("GET {url}");
        let response = self.send(self.client.get(url)).await?;
        let response = Self::check_status(response).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Collects every page by following `next` links.
    pub(in crate::providers::bitbucket) async fn get_all_pages<T>(&self, url: Url) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut next = Some(url);

        while let Some(url) = next.take() {
            let page: Paginated<T> = self.get_json(url).await?;
            items.extend(page.values);
            next = page
                .next
                .map(|link| {
                    Url::parse(&link)
                        .map_err(|e| PipeLensError::Config(format!("Invalid next link: {e}")))
                })
                .transpose()?;
        }

        Ok(items)
    }

    pub(in crate::providers::bitbucket) fn request(&self, url: Url) -> RequestBuilder {
        self.client.get(url)
    }

    /// Turns non-success statuses into [`PipeLensError::Api`].
    pub(in crate::providers::bitbucket) async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        Err(PipeLensError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> BitbucketClient {
        BitbucketClient::new(base_url, "acme", "shop", None).unwrap()
    }

    #[test]
    fn test_endpoint_keeps_api_version_prefix() {
        let url = client("https://api.bitbucket.org/2.0")
            .endpoint(&["{a1b2}", "steps", ""])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.bitbucket.org/2.0/repositories/acme/shop/pipelines/%7Ba1b2%7D/steps/"
        );
    }

    #[test]
    fn test_endpoint_with_trailing_slash_base() {
        let url = client("https://api.bitbucket.org/2.0/").endpoint(&[""]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.bitbucket.org/2.0/repositories/acme/shop/pipelines/"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let result = BitbucketClient::new("not a url", "acme", "shop", None);
        assert!(matches!(result, Err(PipeLensError::Config(_))));
    }

    #[tokio::test]
    async fn test_api_error_carries_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repositories/acme/shop/pipelines/p-1")
            .match_header("authorization", "Bearer secret")
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;

        let client =
            BitbucketClient::new(&server.url(), "acme", "shop", Some(Token::from("secret")))
                .unwrap();
        let url = client.endpoint(&["p-1"]).unwrap();
        let err = client
            .get_json::<serde_json::Value>(url)
            .await
            .unwrap_err();

        mock.assert_async().await;
        match err {
            PipeLensError::Api { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "forbidden");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
