//! The device proxy.
//!
//! [`ProxyDevice`] bridges between a raw input device and the bus:
//!
//! * **Outbound (pose)** – the device pose `cur` is remapped to
//!   `base.inverse() * cur * tip` and published as a `TransformStamped` on
//!   `<arm>/measured_cp`.
//!
//! * **Outbound (twist)** – linear and angular velocity are mapped through
//!   `base.inverse()` and published on `<arm>/measured_cv`.
//!
//! * **Outbound (gripper, status)** – gripper joint state, heartbeat, control
//!   mode and gripper-closed flag.
//!
//! * **Inbound (force)** – `<arm>/body/servo_cf` wrenches are consumed by a
//!   background task; the latest force is available via
//!   [`ProxyDevice::commanded_force`].

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use teleop_frames::Frame;
use teleop_middleware::{TopicReceiver, Transport};
use teleop_types::{
    Header, JointState, Message, TeleopError, Transform, TransformStamped, Twist, TwistStamped,
    Vector3,
};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::arm::ArmKind;
use crate::gripper::GripperMapping;
use crate::topics::ArmTopics;

/// Control mode reported on `<arm>/robot_state`.
pub const ROBOT_STATE: &str = "DVRK_EFFORT_CARTESIAN";

#[derive(Debug)]
struct ProxyState {
    base: Frame,
    tip: Frame,
    cur: Frame,
    gripper_angle: f64,
}

/// Stand-in for one master arm on the bus.
///
/// All methods take `&self`; share a proxy between tasks with an [`Arc`].
pub struct ProxyDevice {
    arm: ArmKind,
    topics: ArmTopics,
    source: String,
    transport: Arc<dyn Transport>,
    gripper: GripperMapping,
    state: Mutex<ProxyState>,
    seq: AtomicU32,
    force: Arc<watch::Sender<Vector3>>,
    listener: JoinHandle<()>,
}

impl ProxyDevice {
    /// Create a proxy for `arm_name` and start listening for commanded
    /// wrenches.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::Channel`] when called outside a Tokio runtime,
    /// since the force listener cannot be spawned.
    pub fn new(arm_name: &str, transport: Arc<dyn Transport>) -> Result<Self, TeleopError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TeleopError::Channel(format!("no async runtime for force listener: {e}")))?;

        let arm = ArmKind::parse(arm_name);
        let topics = ArmTopics::new(arm_name);
        let (base, tip) = arm.default_frames();
        let (force, _) = watch::channel(Vector3::zero());
        let force = Arc::new(force);

        let receiver = transport.subscribe(&topics.servo_cf);
        let listener = runtime.spawn(listen_for_wrenches(receiver, Arc::clone(&force)));

        info!(arm = %arm, "proxy device started");

        Ok(Self {
            source: format!("teleop-proxy::{arm_name}"),
            arm,
            topics,
            transport,
            gripper: GripperMapping::default(),
            state: Mutex::new(ProxyState {
                base,
                tip,
                cur: Frame::identity(),
                gripper_angle: 0.0,
            }),
            seq: AtomicU32::new(0),
            force,
            listener,
        })
    }

    /// Replace the gripper angle mapping.
    pub fn with_gripper_mapping(mut self, mapping: GripperMapping) -> Self {
        self.gripper = mapping;
        self
    }

    pub fn arm(&self) -> &ArmKind {
        &self.arm
    }

    pub fn name(&self) -> String {
        self.arm.to_string()
    }

    pub fn topics(&self) -> &ArmTopics {
        &self.topics
    }

    pub fn gripper_mapping(&self) -> GripperMapping {
        self.gripper
    }

    // -----------------------------------------------------------------------
    // Frames
    // -----------------------------------------------------------------------

    pub fn set_base_frame(&self, frame: Frame) {
        self.state().base = frame;
    }

    pub fn set_tip_frame(&self, frame: Frame) {
        self.state().tip = frame;
    }

    pub fn base_frame(&self) -> Frame {
        self.state().base
    }

    pub fn tip_frame(&self) -> Frame {
        self.state().tip
    }

    /// The raw device frame, before base/tip remapping.
    pub fn pose(&self) -> Frame {
        self.state().cur
    }

    /// The remapped pose, as it is published on `measured_cp`.
    pub fn published_pose(&self) -> Frame {
        let state = self.state();
        state.base.inverse() * state.cur * state.tip
    }

    // -----------------------------------------------------------------------
    // Device input
    // -----------------------------------------------------------------------

    /// Set the device position and publish the remapped pose.
    pub fn set_pos(&self, x: f64, y: f64, z: f64) -> Result<(), TeleopError> {
        self.state().cur.set_position(x, y, z);
        self.publish_pose()
    }

    /// Set the device orientation from roll/pitch/yaw and publish the
    /// remapped pose.
    pub fn set_orientation(&self, roll: f64, pitch: f64, yaw: f64) -> Result<(), TeleopError> {
        self.state().cur.set_rotation_rpy(roll, pitch, yaw);
        self.publish_pose()
    }

    /// Quaternion variant of [`set_orientation`][Self::set_orientation].
    ///
    /// A degenerate quaternion leaves the pose untouched and publishes
    /// nothing.
    pub fn set_orientation_quaternion(&self, x: f64, y: f64, z: f64, w: f64) -> Result<(), TeleopError> {
        self.state().cur.set_rotation_quaternion(x, y, z, w)?;
        self.publish_pose()
    }

    /// Map the device twist through the inverse base frame and publish it.
    ///
    /// Both vectors go through the full frame, translation included, the
    /// same way the pose position does.
    pub fn set_twist(&self, v_x: f64, v_y: f64, v_z: f64, w_x: f64, w_y: f64, w_z: f64) -> Result<(), TeleopError> {
        let to_base = self.state().base.inverse();
        let [lx, ly, lz] = to_base.transform_point([v_x, v_y, v_z]);
        let [ax, ay, az] = to_base.transform_point([w_x, w_y, w_z]);

        let msg = TwistStamped {
            header: self.header(),
            twist: Twist {
                linear: Vector3::new(lx, ly, lz),
                angular: Vector3::new(ax, ay, az),
            },
        };
        self.publish(&self.topics.measured_cv, Message::TwistStamped(msg))
    }

    /// Map a normalized gripper opening to a joint angle and publish it.
    pub fn set_gripper_angle(&self, normalized: f64) -> Result<(), TeleopError> {
        let angle = self.gripper.angle_for(normalized);
        self.state().gripper_angle = angle;

        let msg = JointState {
            header: self.header(),
            position: vec![angle],
            ..JointState::default()
        };
        self.publish(&self.topics.gripper_js, Message::JointState(msg))
    }

    /// Last published gripper joint angle (radians).
    pub fn gripper_angle(&self) -> f64 {
        self.state().gripper_angle
    }

    /// Publish the heartbeat, the control mode and the gripper-closed flag.
    pub fn publish_status(&self) -> Result<(), TeleopError> {
        self.publish(&self.topics.status, Message::Empty)?;
        self.publish(&self.topics.robot_state, Message::Text(ROBOT_STATE.to_string()))?;
        self.publish(&self.topics.gripper_closed, Message::Flag(true))
    }

    // -----------------------------------------------------------------------
    // Force feedback
    // -----------------------------------------------------------------------

    /// Latest commanded force, zero until the first wrench arrives.
    pub fn commanded_force(&self) -> Vector3 {
        *self.force.borrow()
    }

    /// Watch channel that changes whenever a new wrench is applied.
    pub fn subscribe_force(&self) -> watch::Receiver<Vector3> {
        self.force.subscribe()
    }

    /// Apply a message received on the `servo_cf` topic.
    ///
    /// Only the force part of the wrench is kept.
    pub fn handle_wrench(&self, msg: &Message) -> Result<Vector3, TeleopError> {
        apply_wrench(&self.topics.servo_cf, msg, &self.force)
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn state(&self) -> MutexGuard<'_, ProxyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn header(&self) -> Header {
        Header::now(self.seq.fetch_add(1, Ordering::Relaxed), self.arm.to_string())
    }

    fn publish_pose(&self) -> Result<(), TeleopError> {
        let pose = self.published_pose();
        let msg = TransformStamped {
            header: self.header(),
            child_frame_id: format!("{}/tip", self.arm),
            transform: Transform::from(&pose),
        };
        self.publish(&self.topics.measured_cp, Message::TransformStamped(msg))
    }

    fn publish(&self, topic: &str, msg: Message) -> Result<(), TeleopError> {
        let kind = msg.kind();
        let receivers = self.transport.publish(topic, &self.source, msg)?;
        debug!(topic, kind, receivers, "published");
        Ok(())
    }
}

impl Drop for ProxyDevice {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

impl std::fmt::Debug for ProxyDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyDevice")
            .field("arm", &self.arm)
            .field("topics", &self.topics)
            .field("gripper", &self.gripper)
            .field("state", &*self.state())
            .field("commanded_force", &self.commanded_force())
            .finish()
    }
}

fn apply_wrench(topic: &str, msg: &Message, force: &watch::Sender<Vector3>) -> Result<Vector3, TeleopError> {
    match msg {
        Message::WrenchStamped(w) => {
            let f = w.wrench.force;
            force.send_replace(f);
            Ok(f)
        }
        other => Err(TeleopError::UnexpectedMessage {
            topic: topic.to_string(),
            expected: "geometry_msgs/WrenchStamped".to_string(),
            found: other.kind().to_string(),
        }),
    }
}

async fn listen_for_wrenches(mut receiver: TopicReceiver, force: Arc<watch::Sender<Vector3>>) {
    loop {
        match receiver.recv().await {
            Ok(event) => {
                if let Err(e) = apply_wrench(receiver.topic(), &event.payload, &force) {
                    warn!(error = %e, source = %event.source, "ignoring commanded wrench");
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(topic = receiver.topic(), lagged_by = n, "force listener lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;
    use std::time::Duration;
    use teleop_middleware::EventBus;
    use teleop_types::{Wrench, WrenchStamped};

    fn make_proxy(arm: &str) -> (EventBus, ProxyDevice) {
        let bus = EventBus::default();
        let proxy = ProxyDevice::new(arm, Arc::new(bus.clone())).expect("proxy");
        (bus, proxy)
    }

    fn wrench(fx: f64, fy: f64, fz: f64) -> Message {
        Message::WrenchStamped(WrenchStamped {
            header: Header::default(),
            wrench: Wrench {
                force: Vector3::new(fx, fy, fz),
                torque: Vector3::new(9.0, 9.0, 9.0),
            },
        })
    }

    #[test]
    fn new_outside_runtime_is_an_error() {
        let bus = EventBus::default();
        let result = ProxyDevice::new("MTMR", Arc::new(bus));
        assert!(matches!(result, Err(TeleopError::Channel(_))));
    }

    #[tokio::test]
    async fn initial_state() {
        let (_, proxy) = make_proxy("MTMR");
        assert_eq!(proxy.pose(), Frame::identity());
        assert_eq!(proxy.pose().quaternion_xyzw(), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(proxy.commanded_force(), Vector3::zero());
        assert_eq!(proxy.gripper_angle(), 0.0);
        assert_eq!(proxy.name(), "MTMR");
    }

    #[tokio::test]
    async fn set_pos_publishes_remapped_pose() -> Result<(), Box<dyn std::error::Error>> {
        let (bus, proxy) = make_proxy("MTMR");
        let mut rx = bus.subscribe("MTMR/measured_cp");

        proxy.set_pos(1.0, 2.0, 3.0)?;

        let event = rx.recv().await?;
        let Message::TransformStamped(msg) = event.payload else {
            panic!("expected TransformStamped, got {:?}", event.payload);
        };
        // base yaw of ~+90 deg inverted maps (x, y) to (y, -x).
        let t = msg.transform.translation;
        assert!((t.x - 2.0).abs() < 1e-4, "x={}", t.x);
        assert!((t.y + 1.0).abs() < 1e-4, "y={}", t.y);
        assert!((t.z - 3.0).abs() < 1e-9);
        assert_eq!(msg.header.frame_id, "MTMR");
        assert_eq!(msg.child_frame_id, "MTMR/tip");

        // The raw pose is kept untransformed.
        assert_eq!(proxy.pose().position(), [1.0, 2.0, 3.0]);
        Ok(())
    }

    #[tokio::test]
    async fn set_orientation_publishes_base_inverse_cur_tip() -> Result<(), Box<dyn std::error::Error>> {
        let (bus, proxy) = make_proxy("MTML");
        let mut rx = bus.subscribe("MTML/measured_cp");

        proxy.set_orientation(0.3, 0.0, 0.0)?;

        let Message::TransformStamped(msg) = rx.recv().await?.payload else {
            panic!("expected TransformStamped");
        };
        let published = Frame::try_from(&msg.transform)?;
        let expected = proxy.base_frame().inverse() * Frame::from_rpy(0.3, 0.0, 0.0) * proxy.tip_frame();
        assert!(published.approx_eq(&expected, 1e-9));
        Ok(())
    }

    #[tokio::test]
    async fn identity_frames_publish_raw_pose() -> Result<(), Box<dyn std::error::Error>> {
        let (bus, proxy) = make_proxy("Falcon");
        let mut rx = bus.subscribe("Falcon/measured_cp");

        proxy.set_orientation(0.0, 0.0, FRAC_PI_2)?;

        let Message::TransformStamped(msg) = rx.recv().await?.payload else {
            panic!("expected TransformStamped");
        };
        let published = Frame::try_from(&msg.transform)?;
        assert!(published.approx_eq(&Frame::from_rpy(0.0, 0.0, FRAC_PI_2), 1e-9));
        Ok(())
    }

    #[tokio::test]
    async fn custom_base_and_tip_frames_are_used() {
        let (_, proxy) = make_proxy("Falcon");
        let mut base = Frame::identity();
        base.set_position(0.0, 0.0, 1.0);
        proxy.set_base_frame(base);
        proxy.set_tip_frame(Frame::from_rpy(FRAC_PI_2, 0.0, 0.0));

        proxy.set_pos(0.0, 0.0, 0.0).unwrap();
        let pose = proxy.published_pose();
        assert!((pose.position()[2] + 1.0).abs() < 1e-12);
        assert!((pose.rpy().0 - FRAC_PI_2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn degenerate_quaternion_publishes_nothing() {
        let (bus, proxy) = make_proxy("MTMR");
        let mut rx = bus.subscribe("MTMR/measured_cp");

        let result = proxy.set_orientation_quaternion(0.0, 0.0, 0.0, 0.0);
        assert!(matches!(result, Err(TeleopError::InvalidArgument(_))));
        assert!(rx.try_recv().is_err());
        assert_eq!(proxy.pose(), Frame::identity());
    }

    #[tokio::test]
    async fn published_orientation_has_non_negative_w() -> Result<(), Box<dyn std::error::Error>> {
        let (bus, proxy) = make_proxy("Falcon");
        let mut rx = bus.subscribe("Falcon/measured_cp");

        proxy.set_orientation_quaternion(0.0, 0.0, 0.0, -1.0)?;

        let Message::TransformStamped(msg) = rx.recv().await?.payload else {
            panic!("expected TransformStamped");
        };
        let q = msg.transform.rotation;
        assert!((q.w - 1.0).abs() < 1e-12);
        assert!(q.x.abs() < 1e-12 && q.y.abs() < 1e-12 && q.z.abs() < 1e-12);
        Ok(())
    }

    #[tokio::test]
    async fn twist_is_mapped_through_inverse_base() -> Result<(), Box<dyn std::error::Error>> {
        let (bus, proxy) = make_proxy("Falcon");
        let mut base = Frame::from_rpy(0.0, 0.0, FRAC_PI_2);
        base.set_position(10.0, 10.0, 10.0);
        proxy.set_base_frame(base);
        let mut rx = bus.subscribe("Falcon/measured_cv");

        proxy.set_twist(1.0, 0.0, 0.0, 0.0, 1.0, 0.0)?;

        let Message::TwistStamped(msg) = rx.recv().await?.payload else {
            panic!("expected TwistStamped");
        };
        let lin = msg.twist.linear;
        let ang = msg.twist.angular;
        assert!((lin.x + 10.0).abs() < 1e-9 && (lin.y - 9.0).abs() < 1e-9 && (lin.z + 10.0).abs() < 1e-9);
        assert!((ang.x + 9.0).abs() < 1e-9 && (ang.y - 10.0).abs() < 1e-9 && (ang.z + 10.0).abs() < 1e-9);
        Ok(())
    }

    #[tokio::test]
    async fn zero_twist_picks_up_base_offset() -> Result<(), Box<dyn std::error::Error>> {
        let (bus, proxy) = make_proxy("Falcon");
        let mut base = Frame::identity();
        base.set_position(1.0, 2.0, 3.0);
        proxy.set_base_frame(base);
        let mut rx = bus.subscribe("Falcon/measured_cv");

        proxy.set_twist(0.0, 0.0, 0.0, 0.0, 0.0, 0.0)?;

        let Message::TwistStamped(msg) = rx.recv().await?.payload else {
            panic!("expected TwistStamped");
        };
        for v in [msg.twist.linear, msg.twist.angular] {
            assert!((v.x + 1.0).abs() < 1e-9 && (v.y + 2.0).abs() < 1e-9 && (v.z + 3.0).abs() < 1e-9);
        }
        Ok(())
    }

    #[tokio::test]
    async fn gripper_angle_is_mapped_and_published() -> Result<(), Box<dyn std::error::Error>> {
        let (bus, proxy) = make_proxy("MTMR");
        let mut rx = bus.subscribe("MTMR/gripper/measured_js");

        proxy.set_gripper_angle(1.0)?;

        let Message::JointState(js) = rx.recv().await?.payload else {
            panic!("expected JointState");
        };
        assert_eq!(js.position.len(), 1);
        assert!((js.position[0] - 1.2).abs() < 1e-12);
        assert!((proxy.gripper_angle() - 1.2).abs() < 1e-12);
        Ok(())
    }

    #[tokio::test]
    async fn custom_gripper_mapping() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let proxy = ProxyDevice::new("MTMR", Arc::new(bus))?
            .with_gripper_mapping(GripperMapping::new(0.0, 2.0));
        proxy.set_gripper_angle(0.25)?;
        assert!((proxy.gripper_angle() - 0.5).abs() < 1e-12);
        Ok(())
    }

    #[tokio::test]
    async fn publish_status_sends_three_messages() -> Result<(), Box<dyn std::error::Error>> {
        let (bus, proxy) = make_proxy("MTMR");
        let mut status = bus.subscribe("MTMR/status");
        let mut state = bus.subscribe("MTMR/robot_state");
        let mut closed = bus.subscribe("MTMR/gripper_closed_event");

        proxy.publish_status()?;

        assert_eq!(status.recv().await?.payload, Message::Empty);
        assert_eq!(state.recv().await?.payload, Message::Text(ROBOT_STATE.to_string()));
        assert_eq!(closed.recv().await?.payload, Message::Flag(true));
        Ok(())
    }

    #[tokio::test]
    async fn header_seq_increases() -> Result<(), Box<dyn std::error::Error>> {
        let (bus, proxy) = make_proxy("MTMR");
        let mut rx = bus.subscribe("MTMR/measured_cp");

        proxy.set_pos(0.0, 0.0, 0.0)?;
        proxy.set_pos(0.0, 0.0, 1.0)?;

        let seqs: Vec<u32> = [rx.recv().await?, rx.recv().await?]
            .into_iter()
            .filter_map(|e| match e.payload {
                Message::TransformStamped(m) => Some(m.header.seq),
                _ => None,
            })
            .collect();
        assert_eq!(seqs.len(), 2);
        assert!(seqs[1] > seqs[0]);
        Ok(())
    }

    #[tokio::test]
    async fn handle_wrench_keeps_force_only() {
        let (_, proxy) = make_proxy("MTMR");
        let f = proxy.handle_wrench(&wrench(1.0, -2.0, 3.5)).unwrap();
        assert_eq!(f, Vector3::new(1.0, -2.0, 3.5));
        assert_eq!(proxy.commanded_force(), Vector3::new(1.0, -2.0, 3.5));
    }

    #[tokio::test]
    async fn handle_wrench_rejects_other_messages() {
        let (_, proxy) = make_proxy("MTMR");
        let result = proxy.handle_wrench(&Message::Flag(true));
        assert!(matches!(result, Err(TeleopError::UnexpectedMessage { .. })));
        assert_eq!(proxy.commanded_force(), Vector3::zero());
    }

    #[tokio::test]
    async fn listener_applies_published_wrench() {
        let (bus, proxy) = make_proxy("MTMR");
        let mut changes = proxy.subscribe_force();

        bus.publish("MTMR/body/servo_cf", "sim", wrench(0.5, 0.0, -0.5));

        tokio::time::timeout(Duration::from_secs(1), changes.changed())
            .await
            .expect("force update within timeout")
            .expect("sender alive");
        assert_eq!(proxy.commanded_force(), Vector3::new(0.5, 0.0, -0.5));
    }

    #[tokio::test]
    async fn listener_ignores_wrong_message_type() {
        let (bus, proxy) = make_proxy("MTMR");
        let mut changes = proxy.subscribe_force();

        bus.publish("MTMR/body/servo_cf", "sim", Message::Empty);
        bus.publish("MTMR/body/servo_cf", "sim", wrench(0.0, 1.0, 0.0));

        tokio::time::timeout(Duration::from_secs(1), changes.changed())
            .await
            .expect("force update within timeout")
            .expect("sender alive");
        assert_eq!(proxy.commanded_force(), Vector3::new(0.0, 1.0, 0.0));
    }

    #[tokio::test]
    async fn drop_stops_listener() {
        let bus = EventBus::default();
        let proxy = ProxyDevice::new("MTMR", Arc::new(bus.clone())).unwrap();
        assert_eq!(bus.subscriber_count("MTMR/body/servo_cf"), 1);
        drop(proxy);

        // Give the runtime a chance to tear the aborted task down.
        for _ in 0..10 {
            if bus.subscriber_count("MTMR/body/servo_cf") == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(bus.subscriber_count("MTMR/body/servo_cf"), 0);
    }
}
