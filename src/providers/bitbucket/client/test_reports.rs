use super::core::BitbucketClient;
use crate::error::Result;
use crate::providers::bitbucket::types::{TestCaseDto, TestCaseReasonDto, TestReportDto};

impl BitbucketClient {
    /// Test summary of a step, or `None` when the step published no report.
    pub async fn get_test_report(
        &self,
        pipeline_id: &str,
        step_id: &str,
    ) -> Result<Option<TestReportDto>> {
        let url = self.endpoint(&[pipeline_id, "steps", step_id, "test_reports"])?;
        match self.get_json(url).await {
            Ok(report) => Ok(Some(report)),
            Err(e) if e.is_unavailable() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn list_test_cases(&self, pipeline_id: &str, step_id: &str) -> Result<Vec<TestCaseDto>> {
        let url = self.endpoint(&[pipeline_id, "steps", step_id, "test_reports", "test_cases"])?;
        self.get_all_pages(url).await
    }

    pub async fn list_test_case_reasons(
        &self,
        pipeline_id: &str,
        step_id: &str,
        case_id: &str,
    ) -> Result<Vec<TestCaseReasonDto>> {
        let url = self.endpoint(&[
            pipeline_id,
            "steps",
            step_id,
            "test_reports",
            "test_cases",
            case_id,
            "test_case_reasons",
        ])?;
        self.get_all_pages(url).await
    }
}
