//! Topic names for one arm, all rooted at the arm name.

/// Every topic a [`ProxyDevice`][crate::ProxyDevice] touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmTopics {
    /// Outbound cartesian pose.
    pub measured_cp: String,
    /// Outbound cartesian twist.
    pub measured_cv: String,
    /// Outbound gripper joint state.
    pub gripper_js: String,
    /// Outbound heartbeat.
    pub status: String,
    /// Outbound control mode string.
    pub robot_state: String,
    /// Outbound gripper closed flag.
    pub gripper_closed: String,
    /// Inbound commanded wrench.
    pub servo_cf: String,
}

impl ArmTopics {
    pub fn new(prefix: &str) -> Self {
        Self {
            measured_cp: format!("{prefix}/measured_cp"),
            measured_cv: format!("{prefix}/measured_cv"),
            gripper_js: format!("{prefix}/gripper/measured_js"),
            status: format!("{prefix}/status"),
            robot_state: format!("{prefix}/robot_state"),
            gripper_closed: format!("{prefix}/gripper_closed_event"),
            servo_cf: format!("{prefix}/body/servo_cf"),
        }
    }

    /// Topics the proxy publishes on.
    pub fn outbound(&self) -> [&str; 6] {
        [
            &self.measured_cp,
            &self.measured_cv,
            &self.gripper_js,
            &self.status,
            &self.robot_state,
            &self.gripper_closed,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_prefix() {
        let t = ArmTopics::new("MTML");
        assert_eq!(t.measured_cp, "MTML/measured_cp");
        assert_eq!(t.measured_cv, "MTML/measured_cv");
        assert_eq!(t.gripper_js, "MTML/gripper/measured_js");
        assert_eq!(t.status, "MTML/status");
        assert_eq!(t.robot_state, "MTML/robot_state");
        assert_eq!(t.gripper_closed, "MTML/gripper_closed_event");
        assert_eq!(t.servo_cf, "MTML/body/servo_cf");
    }

    #[test]
    fn outbound_excludes_servo_cf() {
        let t = ArmTopics::new("MTMR");
        assert!(!t.outbound().contains(&t.servo_cf.as_str()));
        assert_eq!(t.outbound().len(), 6);
    }
}
