use log::debug;
use url::Url;

use super::core::{BitbucketClient, MAX_PAGE_LEN};
use crate::error::Result;
use crate::providers::bitbucket::types::{Paginated, PipelineDto, StepDto};

impl BitbucketClient {
    /// Most recent pipelines, newest first, at most `limit` of them.
    pub async fn list_pipelines(&self, limit: usize) -> Result<Vec<PipelineDto>> {
        let mut url = self.endpoint(&[""])?;
        url.query_pairs_mut()
            .append_pair("sort", "-created_on")
            .append_pair("pagelen", &limit.clamp(1, MAX_PAGE_LEN).to_string());

        let mut pipelines = Vec::with_capacity(limit);
        let mut next = Some(url);

        while let Some(url) = next.take() {
            let page: Paginated<PipelineDto> = self.get_json(url).await?;
            pipelines.extend(page.values);
            if pipelines.len() >= limit {
                break;
            }
            next = page.next.and_then(|link| Url::parse(&link).ok());
        }

        pipelines.truncate(limit);
        debug!("Listed {} recent pipelines", pipelines.len());
        Ok(pipelines)
    }

    pub async fn get_pipeline(&self, pipeline_id: &str) -> Result<PipelineDto> {
        self.get_json(self.endpoint(&[pipeline_id])?).await
    }

    pub async fn list_steps(&self, pipeline_id: &str) -> Result<Vec<StepDto>> {
        self.get_all_pages(self.endpoint(&[pipeline_id, "steps", ""])?)
            .await
    }

    pub async fn get_step(&self, pipeline_id: &str, step_id: &str) -> Result<StepDto> {
        self.get_json(self.endpoint(&[pipeline_id, "steps", step_id])?)
            .await
    }
}
