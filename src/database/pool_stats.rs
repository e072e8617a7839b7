//! Point-in-time view of a tenant connection pool.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    /// Tenant code or the consolidated source key
    pub name: String,
    pub size: u32,
    pub idle: usize,
    pub active: usize,
    pub max_connections: u32,
}

impl PoolSnapshot {
    pub fn utilization(&self) -> f64 {
        if self.max_connections == 0 {
            return 0.0;
        }
        self.active as f64 / self.max_connections as f64
    }

    /// No free connection left and the pool cannot grow
    pub fn is_saturated(&self) -> bool {
        self.idle == 0 && self.size >= self.max_connections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utilization_and_saturation() {
        let snapshot = PoolSnapshot {
            name: "MY".to_string(),
            size: 10,
            idle: 0,
            active: 10,
            max_connections: 10,
        };
        assert!((snapshot.utilization() - 1.0).abs() < f64::EPSILON);
        assert!(snapshot.is_saturated());

        let empty = PoolSnapshot {
            max_connections: 0,
            ..snapshot
        };
        assert_eq!(empty.utilization(), 0.0);
    }
}
