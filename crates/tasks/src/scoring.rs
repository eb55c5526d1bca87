//! `Scorer` backed by the gRPC model client.

use anyhow::Result;
use async_trait::async_trait;
use ml_client::{FeatureRow, MLScorerClient, ScoreRequest};
use records::Row;
use serde_json::Value;

use crate::traits::Scorer;

#[async_trait]
impl Scorer for MLScorerClient {
    async fn score(
        &self,
        model: &str,
        subject: Option<&str>,
        features: &[String],
        rows: &[Row],
    ) -> Result<Vec<f32>> {
        let request = ScoreRequest {
            model: model.to_string(),
            subject_id: subject.unwrap_or_default().to_string(),
            rows: rows.iter().map(|row| feature_vector(row, features)).collect(),
        };
        Ok(MLScorerClient::score(self, request).await?)
    }
}

/// Numeric view of the named features of a row.
///
/// Missing and non-numeric values are sent as 0.0, booleans as 0/1.
pub fn feature_vector(row: &Row, features: &[String]) -> FeatureRow {
    let features = features
        .iter()
        .map(|name| {
            let value = match row.get(name) {
                Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
                Some(Value::Bool(b)) => f64::from(u8::from(*b)),
                _ => 0.0,
            };
            (name.clone(), value)
        })
        .collect();
    FeatureRow { features }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_feature_vector_defaults() {
        let row = match json!({"ctr": 0.5, "fresh": true, "title": "x"}) {
            Value::Object(row) => row,
            _ => unreachable!(),
        };
        let names: Vec<String> = ["ctr", "fresh", "title", "missing"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let vector = feature_vector(&row, &names);
        assert_eq!(vector.features["ctr"], 0.5);
        assert_eq!(vector.features["fresh"], 1.0);
        assert_eq!(vector.features["title"], 0.0);
        assert_eq!(vector.features["missing"], 0.0);
    }
}
