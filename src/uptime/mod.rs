//! Uptime evaluation for configured endpoints.
//!
//! Each endpoint is evaluated in configuration order: validate, run the
//! success query, run the failure query, extract both counts, compute the
//! ratio. The first error aborts the whole run.

mod mail;
mod report;

pub use mail::*;
pub use report::*;

use crate::client::{Client, QueryError, QueryOutcome};
use crate::config::{ConfigError, Endpoint};

use std::num::ParseFloatError;
use thiserror::Error;

/// Evaluation error types. Every variant is fatal for the run.
#[derive(Error, Debug)]
pub enum EvalError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("error querying server for {endpoint:?}: {source}")]
    Query {
        endpoint: String,
        #[source]
        source: QueryError,
    },
    #[error("error parsing value {value:?} for {endpoint:?}: {source}")]
    Parse {
        endpoint: String,
        value: String,
        #[source]
        source: ParseFloatError,
    },
}

impl EvalError {
    fn from_query(endpoint: &str, err: QueryError) -> Self {
        match err {
            QueryError::Parse { value, source } => EvalError::Parse {
                endpoint: endpoint.to_string(),
                value,
                source,
            },
            source => EvalError::Query {
                endpoint: endpoint.to_string(),
                source,
            },
        }
    }
}

/// Derived uptime for one endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct UptimeRecord {
    pub endpoint: String,
    pub success_count: f64,
    pub failure_count: f64,
    pub uptime_percent: f64,
}

impl UptimeRecord {
    pub fn new(endpoint: &str, success_count: f64, failure_count: f64) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            success_count,
            failure_count,
            uptime_percent: uptime_percent(success_count, failure_count),
        }
    }

    /// No traffic in either direction.
    pub fn is_unused(&self) -> bool {
        self.success_count == 0.0 && self.failure_count == 0.0
    }
}

/// `success / (success + failure) * 100`, or 100 when both are zero.
pub fn uptime_percent(success: f64, failure: f64) -> f64 {
    if success == 0.0 && failure == 0.0 {
        return 100.0;
    }
    success / (success + failure) * 100.0
}

/// Count carried by an outcome. Absent metrics count as zero.
pub fn extract_count(outcome: &QueryOutcome) -> f64 {
    outcome.first_value().unwrap_or(0.0)
}

/// Runs the success/failure query pair for each endpoint.
pub struct Evaluator<'a> {
    client: &'a Client,
}

impl<'a> Evaluator<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Evaluate a single endpoint.
    pub async fn evaluate(&self, endpoint: &Endpoint) -> Result<UptimeRecord, EvalError> {
        endpoint.validate()?;

        let success = self.count(endpoint, &endpoint.success_query).await?;
        let failure = self.count(endpoint, &endpoint.failure_query).await?;

        let record = UptimeRecord::new(&endpoint.name, success, failure);
        if record.is_unused() {
            tracing::debug!("Endpoint {} not used", endpoint.name);
        } else {
            tracing::debug!(
                "Endpoint {}: success={} failure={} uptime={}%",
                endpoint.name,
                success,
                failure,
                record.uptime_percent
            );
        }

        Ok(record)
    }

    /// Evaluate every endpoint in order, appending one row per endpoint to
    /// `report`. Stops at the first error.
    pub async fn run(
        &self,
        endpoints: &[Endpoint],
        report: &mut Report,
    ) -> Result<Vec<UptimeRecord>, EvalError> {
        tracing::info!("Evaluating {} endpoints", endpoints.len());

        let mut records = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let record = self.evaluate(endpoint).await?;
            report.push(
                &record.endpoint,
                record.success_count,
                record.failure_count,
                record.uptime_percent,
            );
            records.push(record);
        }

        Ok(records)
    }

    async fn count(&self, endpoint: &Endpoint, expr: &str) -> Result<f64, EvalError> {
        let outcome = self
            .client
            .query(expr)
            .await
            .map_err(|e| EvalError::from_query(&endpoint.name, e))?;
        Ok(extract_count(&outcome))
    }
}
