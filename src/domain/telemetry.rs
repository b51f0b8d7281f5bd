// Telemetry data domain models
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single sample value. Numeric, boolean and string channels share one series shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Epoch milliseconds
    pub x: i64,
    pub y: Value,
}

impl DataPoint {
    pub fn new(x: i64, y: Value) -> Self {
        Self { x, y }
    }

    pub fn number(x: i64, y: f64) -> Self {
        Self::new(x, Value::Number(y))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSeries {
    pub name: String,
    #[serde(default)]
    pub datapoints: Vec<DataPoint>,
}

/// Summary of all events that fell into one bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinStats {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinnedPoint {
    pub x: i64,
    pub y: BinStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinnedSeries {
    pub name: String,
    #[serde(default)]
    pub datapoints: Vec<BinnedPoint>,
}

impl BinnedSeries {
    /// Number of underlying events across all bins.
    pub fn event_count(&self) -> u64 {
        self.datapoints.iter().map(|p| p.y.count).sum()
    }

    /// Plottable points, one per bin at its mean.
    pub fn mean_points(&self) -> Vec<DataPoint> {
        self.datapoints
            .iter()
            .map(|p| DataPoint::number(p.x, p.y.mean))
            .collect()
    }
}

/// Result of fetching one series for display.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesData {
    pub datapoints: Vec<DataPoint>,
    pub is_reduced: bool,
    pub num_datapoints: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_deserializes_untagged() {
        let points: Vec<DataPoint> =
            serde_json::from_str(r#"[{"x":1,"y":2.5},{"x":2,"y":"open"},{"x":3,"y":true}]"#)
                .unwrap();
        assert_eq!(points[0].y, Value::Number(2.5));
        assert_eq!(points[1].y, Value::Text("open".to_string()));
        assert_eq!(points[2].y, Value::Bool(true));
    }

    #[test]
    fn test_binned_event_count() {
        let series = BinnedSeries {
            name: "ch".to_string(),
            datapoints: vec![
                BinnedPoint {
                    x: 0,
                    y: BinStats { min: 1.0, mean: 2.0, max: 3.0, count: 40 },
                },
                BinnedPoint {
                    x: 10,
                    y: BinStats { min: 1.0, mean: 1.5, max: 2.0, count: 60 },
                },
            ],
        };
        assert_eq!(series.event_count(), 100);
        assert_eq!(series.mean_points()[1], DataPoint::number(10, 1.5));
    }
}
