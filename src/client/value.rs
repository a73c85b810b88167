//! Query result model and wire decoding.

use serde::Deserialize;
use std::collections::BTreeMap;

use super::QueryError;

/// Label set identifying a series. Sorted by key.
pub type Labels = BTreeMap<String, String>;

/// A single `(timestamp, value)` pair. Timestamps are Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub timestamp: f64,
    pub value: f64,
}

/// One labeled sample of an instant vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: Labels,
    pub timestamp: f64,
    pub value: f64,
}

/// One labeled series of a range matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub labels: Labels,
    pub points: Vec<Point>,
}

/// The shapes a query result can take. Order is the server's order.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue {
    Scalar { timestamp: f64, value: f64 },
    Vector(Vec<Sample>),
    Matrix(Vec<Series>),
}

impl ResultValue {
    /// True when the result carries no samples at all.
    pub fn is_empty(&self) -> bool {
        match self {
            ResultValue::Scalar { .. } => false,
            ResultValue::Vector(samples) => samples.is_empty(),
            ResultValue::Matrix(series) => series.iter().all(|s| s.points.is_empty()),
        }
    }
}

/// Result of one request/response cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// The query matched nothing.
    Empty,
    Value(ResultValue),
}

impl From<ResultValue> for QueryOutcome {
    fn from(value: ResultValue) -> Self {
        if value.is_empty() {
            QueryOutcome::Empty
        } else {
            QueryOutcome::Value(value)
        }
    }
}

impl QueryOutcome {
    pub fn is_empty(&self) -> bool {
        matches!(self, QueryOutcome::Empty)
    }

    /// First numeric value of the outcome: the scalar, the first sample of a
    /// vector, or the first point of the first non-empty matrix series.
    pub fn first_value(&self) -> Option<f64> {
        match self {
            QueryOutcome::Empty => None,
            QueryOutcome::Value(ResultValue::Scalar { value, .. }) => Some(*value),
            QueryOutcome::Value(ResultValue::Vector(samples)) => {
                samples.first().map(|s| s.value)
            }
            QueryOutcome::Value(ResultValue::Matrix(series)) => series
                .iter()
                .find_map(|s| s.points.first())
                .map(|p| p.value),
        }
    }
}

// ============================================================================
// Wire format
// ============================================================================

/// Response envelope shared by every API call.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub status: String,
    pub data: Option<T>,
    #[serde(default, rename = "errorType")]
    pub error_type: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
pub(crate) enum WireData {
    Scalar(WirePoint),
    Vector(Vec<WireSample>),
    Matrix(Vec<WireSeries>),
}

/// `[timestamp, "value"]`
#[derive(Debug, Deserialize)]
pub(crate) struct WirePoint(f64, String);

#[derive(Debug, Deserialize)]
pub(crate) struct WireSample {
    #[serde(default)]
    metric: Labels,
    value: WirePoint,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireSeries {
    #[serde(default)]
    metric: Labels,
    values: Vec<WirePoint>,
}

impl WirePoint {
    fn into_point(self) -> Result<Point, QueryError> {
        Ok(Point {
            timestamp: self.0,
            value: parse_sample_value(&self.1)?,
        })
    }
}

/// Parse a sample value string. Accepts `NaN`, `+Inf` and `-Inf`.
pub fn parse_sample_value(raw: &str) -> Result<f64, QueryError> {
    raw.trim().parse::<f64>().map_err(|source| QueryError::Parse {
        value: raw.to_string(),
        source,
    })
}

impl TryFrom<WireData> for ResultValue {
    type Error = QueryError;

    fn try_from(data: WireData) -> Result<Self, Self::Error> {
        let value = match data {
            WireData::Scalar(p) => {
                let p = p.into_point()?;
                ResultValue::Scalar {
                    timestamp: p.timestamp,
                    value: p.value,
                }
            }
            WireData::Vector(samples) => ResultValue::Vector(
                samples
                    .into_iter()
                    .map(|s| {
                        let p = s.value.into_point()?;
                        Ok(Sample {
                            labels: s.metric,
                            timestamp: p.timestamp,
                            value: p.value,
                        })
                    })
                    .collect::<Result<_, QueryError>>()?,
            ),
            WireData::Matrix(series) => ResultValue::Matrix(
                series
                    .into_iter()
                    .map(|s| {
                        Ok(Series {
                            labels: s.metric,
                            points: s
                                .values
                                .into_iter()
                                .map(WirePoint::into_point)
                                .collect::<Result<_, QueryError>>()?,
                        })
                    })
                    .collect::<Result<_, QueryError>>()?,
            ),
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(json: &str) -> Result<ResultValue, QueryError> {
        let data: WireData = serde_json::from_str(json).unwrap();
        ResultValue::try_from(data)
    }

    #[test]
    fn test_decode_scalar() {
        let v = decode(r#"{"resultType":"scalar","result":[1700000000.5,"980"]}"#).unwrap();
        assert_eq!(
            v,
            ResultValue::Scalar {
                timestamp: 1700000000.5,
                value: 980.0
            }
        );
    }

    #[test]
    fn test_decode_vector_keeps_order() {
        let v = decode(
            r#"{"resultType":"vector","result":[
                {"metric":{"job":"b"},"value":[1,"2"]},
                {"metric":{"job":"a"},"value":[1,"1"]}
            ]}"#,
        )
        .unwrap();
        match v {
            ResultValue::Vector(samples) => {
                assert_eq!(samples.len(), 2);
                assert_eq!(samples[0].labels["job"], "b");
                assert_eq!(samples[1].labels["job"], "a");
            }
            other => panic!("expected vector, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_special_values() {
        let v = decode(
            r#"{"resultType":"matrix","result":[
                {"metric":{},"values":[[1,"NaN"],[2,"+Inf"],[3,"-Inf"]]}
            ]}"#,
        )
        .unwrap();
        let ResultValue::Matrix(series) = v else {
            panic!("expected matrix");
        };
        let points = &series[0].points;
        assert!(points[0].value.is_nan());
        assert_eq!(points[1].value, f64::INFINITY);
        assert_eq!(points[2].value, f64::NEG_INFINITY);
    }

    #[test]
    fn test_decode_garbled_value() {
        let err = decode(r#"{"resultType":"scalar","result":[1,"12abc"]}"#).unwrap_err();
        assert!(matches!(err, QueryError::Parse { ref value, .. } if value == "12abc"));
    }

    #[test]
    fn test_unknown_result_type_rejected() {
        let res: Result<WireData, _> =
            serde_json::from_str(r#"{"resultType":"histogram","result":[]}"#);
        assert!(res.is_err());
    }

    #[test]
    fn test_empty_outcomes() {
        assert!(QueryOutcome::from(ResultValue::Vector(vec![])).is_empty());
        assert!(QueryOutcome::from(ResultValue::Matrix(vec![Series {
            labels: Labels::new(),
            points: vec![],
        }]))
        .is_empty());
        assert_eq!(QueryOutcome::Empty.first_value(), None);
    }

    #[test]
    fn test_first_value() {
        let outcome = QueryOutcome::from(ResultValue::Matrix(vec![
            Series {
                labels: Labels::new(),
                points: vec![],
            },
            Series {
                labels: Labels::new(),
                points: vec![
                    Point { timestamp: 1.0, value: 7.0 },
                    Point { timestamp: 2.0, value: 8.0 },
                ],
            },
        ]));
        assert_eq!(outcome.first_value(), Some(7.0));
    }
}
