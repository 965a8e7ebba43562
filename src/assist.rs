//! Typed wrappers around the hosted prompt service used for failure
//! prediction and free form questions. Each call is a single attempt.

use std::time::Duration;

use reqwest::blocking::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::domain::AVError;

const PROMPT_TIMEOUT: Duration = Duration::from_secs(60);

/// A named prompt template. `{{{field}}}` is replaced by the input field of
/// the same name.
#[derive(Debug, Clone, Copy)]
pub struct Prompt {
    pub name: &'static str,
    pub template: &'static str,
}

pub const PREDICT_PROMPT: Prompt = Prompt {
    name: "predictAssetFailuresPrompt",
    template: "You are an expert asset failure prediction system.

You will use the historical data and real-time metrics to predict whether an asset will fail.

Asset ID: {{{assetId}}}
Historical Data: {{{historicalData}}}
Real-time Metrics: {{{realtimeMetrics}}}

Based on this information, predict whether the asset will fail, the probability of failure, the reason for failure, and recommend actions to prevent the failure.
",
};

pub const CHAT_PROMPT: Prompt = Prompt {
    name: "chatWithAIPrompt",
    template: "You are an AI assistant embedded within an asset management application.
Respond to the following user query clearly and concisely.

Query: {{{query}}}",
};

pub const SUMMARY_PROMPT: Prompt = Prompt {
    name: "generateExecutiveSummaryPrompt",
    template: "As an executive, I need a brief summary of our key asset insights. Provide a concise overview including the total number of assets, the number of high-risk items, and the total repair costs.

Total Assets: {{{totalAssets}}}
High-Risk Items: {{{highRiskItems}}}
Total Repair Costs: {{{repairCosts}}}",
};

impl Prompt {
    pub fn render(&self, input: &Value) -> String {
        let mut out = self.template.to_string();
        if let Value::Object(fields) = input {
            for (key, value) in fields {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                out = out.replace(&format!("{{{{{{{key}}}}}}}"), &text);
            }
        }
        out
    }
}

/// Executes a prompt remotely and returns its structured output.
pub trait PromptExecutor {
    fn run_prompt(&self, prompt: &Prompt, input: &Value) -> Result<Value, AVError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRequest {
    pub asset_id: String,
    pub historical_data: String,
    pub realtime_metrics: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub predicted_failure: bool,
    pub failure_probability: f64,
    pub failure_reason: String,
    pub recommended_actions: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    pub response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRequest {
    pub total_assets: u64,
    pub high_risk_items: u64,
    pub repair_costs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Summary {
    pub summary: String,
}

fn call<I: Serialize, O: DeserializeOwned>(
    executor: &dyn PromptExecutor,
    prompt: &Prompt,
    input: &I,
) -> Result<O, AVError> {
    let input = serde_json::to_value(input)?;
    let output = executor.run_prompt(prompt, &input).map_err(|e| {
        error!("Prompt {} failed: {}", prompt.name, e);
        match e {
            AVError::Prediction(reason) => AVError::Prediction(reason),
            other => AVError::Prediction(other.to_string()),
        }
    })?;
    serde_json::from_value(output)
        .map_err(|e| AVError::Prediction(format!("unexpected output of {}: {e}", prompt.name)))
}

pub fn predict(
    executor: &dyn PromptExecutor,
    request: &PredictionRequest,
) -> Result<Prediction, AVError> {
    let prediction: Prediction = call(executor, &PREDICT_PROMPT, request)?;
    if !(0.0..=1.0).contains(&prediction.failure_probability) {
        return Err(AVError::Prediction(format!(
            "failure probability {} is outside [0, 1]",
            prediction.failure_probability
        )));
    }
    debug!("Prediction for {}: {:?}", request.asset_id, prediction);
    Ok(prediction)
}

pub fn chat(executor: &dyn PromptExecutor, query: &str) -> Result<ChatReply, AVError> {
    call(
        executor,
        &CHAT_PROMPT,
        &ChatRequest {
            query: query.to_string(),
        },
    )
}

/// Executive summary over inventory totals. High risk items can not exceed
/// the number of assets and repair costs must be a non negative amount.
pub fn summarize(
    executor: &dyn PromptExecutor,
    request: &SummaryRequest,
) -> Result<Summary, AVError> {
    if request.high_risk_items > request.total_assets {
        return Err(AVError::Prediction(format!(
            "{} high risk items but only {} assets",
            request.high_risk_items, request.total_assets
        )));
    }
    if !request.repair_costs.is_finite() || request.repair_costs < 0.0 {
        return Err(AVError::Prediction(format!(
            "invalid repair costs {}",
            request.repair_costs
        )));
    }
    call(executor, &SUMMARY_PROMPT, request)
}

/// Posts `{name, prompt, input}` to a prompt endpoint and reads back
/// `{output}`.
pub struct HttpPromptExecutor {
    client: HttpClient,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpPromptExecutor {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self, AVError> {
        let client = HttpClient::builder().timeout(PROMPT_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key,
        })
    }
}

impl PromptExecutor for HttpPromptExecutor {
    fn run_prompt(&self, prompt: &Prompt, input: &Value) -> Result<Value, AVError> {
        #[derive(Deserialize)]
        struct Response {
            output: Value,
        }

        let body = json!({
            "name": prompt.name,
            "prompt": prompt.render(input),
            "input": input,
        });
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send()?;
        if !response.status().is_success() {
            return Err(AVError::Prediction(format!(
                "prompt service answered {}",
                response.status()
            )));
        }
        let body: Response = response.json()?;
        Ok(body.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct FakeExecutor {
        output: Result<Value, String>,
        seen: RefCell<Vec<String>>,
    }

    impl FakeExecutor {
        fn answering(output: Value) -> Self {
            Self {
                output: Ok(output),
                seen: RefCell::new(Vec::new()),
            }
        }

        fn failing(reason: &str) -> Self {
            Self {
                output: Err(reason.to_string()),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl PromptExecutor for FakeExecutor {
        fn run_prompt(&self, prompt: &Prompt, input: &Value) -> Result<Value, AVError> {
            self.seen.borrow_mut().push(prompt.render(input));
            self.output
                .clone()
                .map_err(AVError::LoadingFailed)
        }
    }

    fn request() -> PredictionRequest {
        PredictionRequest {
            asset_id: "AST-1003".into(),
            historical_data: "3 repairs in 2024".into(),
            realtime_metrics: "temp 92C".into(),
        }
    }

    #[test]
    fn renders_template_fields() {
        let text = PREDICT_PROMPT.render(&serde_json::to_value(request()).unwrap());
        assert!(text.contains("Asset ID: AST-1003\n"));
        assert!(text.contains("Historical Data: 3 repairs in 2024\n"));
        assert!(text.contains("Real-time Metrics: temp 92C\n"));
        assert!(!text.contains("{{{"));
    }

    #[test]
    fn predicts_with_valid_output() {
        let executor = FakeExecutor::answering(json!({
            "predictedFailure": true,
            "failureProbability": 0.82,
            "failureReason": "bearing wear",
            "recommendedActions": "replace bearing",
        }));
        let prediction = predict(&executor, &request()).unwrap();
        assert!(prediction.predicted_failure);
        assert_eq!(prediction.failure_probability, 0.82);
        assert_eq!(prediction.failure_reason, "bearing wear");
        assert_eq!(executor.seen.borrow().len(), 1);
    }

    #[test]
    fn rejects_probability_out_of_range() {
        let executor = FakeExecutor::answering(json!({
            "predictedFailure": false,
            "failureProbability": 1.5,
            "failureReason": "",
            "recommendedActions": "",
        }));
        assert!(matches!(predict(&executor, &request()), Err(AVError::Prediction(_))));
    }

    #[test]
    fn rejects_malformed_output() {
        let executor = FakeExecutor::answering(json!({ "predictedFailure": "maybe" }));
        assert!(matches!(predict(&executor, &request()), Err(AVError::Prediction(_))));
    }

    #[test]
    fn executor_failure_becomes_prediction_error() {
        let executor = FakeExecutor::failing("connection reset");
        match chat(&executor, "how many pumps?") {
            Err(AVError::Prediction(reason)) => assert!(reason.contains("connection reset")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn chat_sends_query_and_reads_response() {
        let executor = FakeExecutor::answering(json!({ "response": "There are 4 pumps." }));
        let reply = chat(&executor, "how many pumps?").unwrap();
        assert_eq!(reply.response, "There are 4 pumps.");
        assert!(executor.seen.borrow()[0].ends_with("Query: how many pumps?"));
    }

    fn summary_request() -> SummaryRequest {
        SummaryRequest {
            total_assets: 12,
            high_risk_items: 3,
            repair_costs: 15400.5,
        }
    }

    #[test]
    fn summarizes_inventory_totals() {
        let executor = FakeExecutor::answering(json!({ "summary": "12 assets, 3 at high risk." }));
        let summary = summarize(&executor, &summary_request()).unwrap();
        assert_eq!(summary.summary, "12 assets, 3 at high risk.");

        let prompt = &executor.seen.borrow()[0];
        assert!(prompt.contains("Total Assets: 12\n"));
        assert!(prompt.contains("High-Risk Items: 3\n"));
        assert!(prompt.ends_with("Total Repair Costs: 15400.5"));
    }

    #[test]
    fn summary_rejects_inconsistent_totals_without_calling() {
        let executor = FakeExecutor::answering(json!({ "summary": "" }));
        let mut request = summary_request();
        request.high_risk_items = 13;
        assert!(matches!(summarize(&executor, &request), Err(AVError::Prediction(_))));
        request.high_risk_items = 3;
        request.repair_costs = -1.0;
        assert!(matches!(summarize(&executor, &request), Err(AVError::Prediction(_))));
        assert!(executor.seen.borrow().is_empty());
    }

    #[test]
    fn summary_failure_and_bad_output_become_prediction_errors() {
        let executor = FakeExecutor::failing("timeout");
        assert!(matches!(
            summarize(&executor, &summary_request()),
            Err(AVError::Prediction(reason)) if reason.contains("timeout")
        ));
        let executor = FakeExecutor::answering(json!({ "text": "no summary field" }));
        assert!(matches!(
            summarize(&executor, &summary_request()),
            Err(AVError::Prediction(_))
        ));
    }
}
