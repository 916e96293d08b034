//! Interactive shell that plays the role of the input device driver.
//!
//! Supported slash-commands:
//!   /help                      – show this list
//!   /arms                      – list proxied arms
//!   /arm <name>                – switch (or add) the active arm
//!   /pos x y z                 – set device position
//!   /rpy r p y                 – set device orientation (roll, pitch, yaw)
//!   /quat x y z w              – set device orientation (quaternion)
//!   /twist vx vy vz wx wy wz   – publish a device twist
//!   /gripper a                 – publish a normalized gripper opening
//!   /status                    – publish status once
//!   /force                     – show the commanded force
//!   /pose                      – show raw and remapped pose
//!   /sweep                     – roll/pitch/yaw sweep on the active arm
//!   /echo                      – toggle printing of the active arm's traffic
//!   /topics                    – list topics on the bus
//!   /quit | /exit              – exit

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use teleop_middleware::EventBus;
use teleop_proxy::{sweep_orientation, ProxyDevice, SweepConfig};
use teleop_types::TeleopError;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::Config;

/// Proxies shared between the shell, the heartbeat and the Ctrl-C handler.
pub type SharedProxies = Arc<Mutex<Vec<Arc<ProxyDevice>>>>;

/// A parsed shell command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Arms,
    Arm(String),
    Pos([f64; 3]),
    Rpy([f64; 3]),
    Quat([f64; 4]),
    Twist([f64; 6]),
    Gripper(f64),
    Status,
    Force,
    Pose,
    Sweep,
    Echo,
    Topics,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, TeleopError> {
        let mut words = line.split_whitespace();
        let name = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();

        let cmd = match name {
            "/help" => Command::Help,
            "/arms" => Command::Arms,
            "/arm" => match args.as_slice() {
                [arm] => Command::Arm((*arm).to_string()),
                _ => return Err(usage("/arm <name>")),
            },
            "/pos" => Command::Pos(floats(&args, "/pos x y z")?),
            "/rpy" => Command::Rpy(floats(&args, "/rpy roll pitch yaw")?),
            "/quat" => Command::Quat(floats(&args, "/quat x y z w")?),
            "/twist" => Command::Twist(floats(&args, "/twist vx vy vz wx wy wz")?),
            "/gripper" => Command::Gripper(floats::<1>(&args, "/gripper opening")?[0]),
            "/status" => Command::Status,
            "/force" => Command::Force,
            "/pose" => Command::Pose,
            "/sweep" => Command::Sweep,
            "/echo" => Command::Echo,
            "/topics" => Command::Topics,
            "/quit" | "/exit" => Command::Quit,
            other => {
                return Err(TeleopError::InvalidArgument(format!("unknown command '{other}'")));
            }
        };
        if !args.is_empty() && !cmd.takes_args() {
            return Err(TeleopError::InvalidArgument(format!("{name} takes no arguments")));
        }
        Ok(cmd)
    }

    fn takes_args(&self) -> bool {
        matches!(
            self,
            Command::Arm(_)
                | Command::Pos(_)
                | Command::Rpy(_)
                | Command::Quat(_)
                | Command::Twist(_)
                | Command::Gripper(_)
        )
    }
}

fn usage(text: &str) -> TeleopError {
    TeleopError::InvalidArgument(format!("usage: {text}"))
}

fn floats<const N: usize>(args: &[&str], usage_text: &str) -> Result<[f64; N], TeleopError> {
    if args.len() != N {
        return Err(usage(usage_text));
    }
    let mut out = [0.0; N];
    for (slot, raw) in out.iter_mut().zip(args) {
        *slot = raw
            .parse::<f64>()
            .map_err(|_| TeleopError::InvalidArgument(format!("'{raw}' is not a number")))?;
    }
    Ok(out)
}

/// Shell state.
pub struct Shell {
    runtime: Handle,
    bus: EventBus,
    proxies: SharedProxies,
    active: Arc<ProxyDevice>,
    config: Config,
    shutdown: Arc<AtomicBool>,
    echo: Option<JoinHandle<()>>,
}

impl Shell {
    /// `proxies` must not be empty; the first one becomes active.
    pub fn new(
        runtime: Handle,
        bus: EventBus,
        proxies: SharedProxies,
        config: Config,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, TeleopError> {
        let active = lock(&proxies)
            .first()
            .cloned()
            .ok_or_else(|| TeleopError::Config("no arms configured".to_string()))?;
        Ok(Self {
            runtime,
            bus,
            proxies,
            active,
            config,
            shutdown,
            echo: None,
        })
    }

    /// Read-eval-print until `/quit`, EOF, or shutdown.
    pub fn run(&mut self) {
        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            print!("{} ", format!("teleop[{}]>", self.active.name()).bold().cyan());
            stdout.flush().ok();

            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    eprintln!("{}: {}", "Read error".red(), e);
                    break;
                }
            }

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match Command::parse(line).and_then(|cmd| self.execute(cmd)) {
                Ok(true) => {}
                Ok(false) => {
                    println!("{}", "Goodbye.".green());
                    self.shutdown.store(true, Ordering::SeqCst);
                    break;
                }
                Err(e) => println!("{} {}", "Error:".red(), e),
            }
        }
    }

    /// Run one command.  Returns `Ok(false)` when the shell should exit.
    pub fn execute(&mut self, cmd: Command) -> Result<bool, TeleopError> {
        match cmd {
            Command::Help => cmd_help(),
            Command::Arms => self.cmd_arms(),
            Command::Arm(name) => self.cmd_arm(&name)?,
            Command::Pos([x, y, z]) => self.active.set_pos(x, y, z)?,
            Command::Rpy([r, p, y]) => self.active.set_orientation(r, p, y)?,
            Command::Quat([x, y, z, w]) => self.active.set_orientation_quaternion(x, y, z, w)?,
            Command::Twist([vx, vy, vz, wx, wy, wz]) => self.active.set_twist(vx, vy, vz, wx, wy, wz)?,
            Command::Gripper(a) => {
                self.active.set_gripper_angle(a)?;
                println!("  gripper angle: {:.4} rad", self.active.gripper_angle());
            }
            Command::Status => self.active.publish_status()?,
            Command::Force => {
                let f = self.active.commanded_force();
                println!("  commanded force: {:.4}, {:.4}, {:.4}", f.x, f.y, f.z);
            }
            Command::Pose => {
                println!("  device    : {}", self.active.pose());
                println!("  published : {}", self.active.published_pose());
            }
            Command::Sweep => self.cmd_sweep()?,
            Command::Echo => self.cmd_echo(),
            Command::Topics => {
                for topic in self.bus.topics() {
                    println!("  {} ({} subscriber(s))", topic.bold(), self.bus.subscriber_count(&topic));
                }
            }
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }

    fn cmd_arms(&self) {
        for proxy in lock(&self.proxies).iter() {
            let marker = if Arc::ptr_eq(proxy, &self.active) { "▶" } else { " " };
            let note = if proxy.arm().is_known() { "" } else { " (identity frames)" };
            println!("  {} {}{}", marker.green(), proxy.name().bold(), note.dimmed());
        }
    }

    fn cmd_arm(&mut self, name: &str) -> Result<(), TeleopError> {
        let existing = lock(&self.proxies).iter().find(|p| p.name() == name).cloned();
        let proxy = match existing {
            Some(p) => p,
            None => {
                let p = {
                    let _enter = self.runtime.enter();
                    ProxyDevice::new(name, Arc::new(self.bus.clone()))?
                };
                let p = Arc::new(p.with_gripper_mapping(self.config.gripper_mapping()));
                lock(&self.proxies).push(Arc::clone(&p));
                println!("  {} added arm {}", "✓".green(), name.bold());
                p
            }
        };
        self.active = proxy;
        if self.echo.is_some() {
            // Follow the new arm.
            self.cmd_echo();
            self.cmd_echo();
        }
        Ok(())
    }

    fn cmd_sweep(&self) -> Result<(), TeleopError> {
        let sweep: SweepConfig = self.config.sweep_config();
        println!(
            "  Sweeping {} from {:.2} to {:.2} in {} step(s) per axis …",
            self.active.name().bold(),
            sweep.min,
            sweep.max,
            sweep.steps
        );
        let proxy = Arc::clone(&self.active);
        let shutdown = Arc::clone(&self.shutdown);
        self.runtime.block_on(async move {
            tokio::select! {
                result = sweep_orientation(&proxy, &sweep) => result,
                _ = wait_for(shutdown) => {
                    warn!("sweep interrupted");
                    Ok(())
                }
            }
        })
    }

    fn cmd_echo(&mut self) {
        if let Some(task) = self.echo.take() {
            task.abort();
            println!("  echo {}", "off".yellow());
            return;
        }
        let prefix = format!("{}/", self.active.name());
        let mut sub = self.bus.subscribe_prefix(prefix.clone());
        self.echo = Some(self.runtime.spawn(async move {
            while let Some(event) = sub.recv().await {
                let body = serde_json::to_string(&event.payload)
                    .unwrap_or_else(|e| format!("<unserializable: {e}>"));
                println!("\n  {} {} {}", event.topic.bold(), event.payload.kind().dimmed(), body);
            }
        }));
        println!("  echo {} for {}*", "on".green(), prefix.bold());
    }
}

impl Drop for Shell {
    fn drop(&mut self) {
        if let Some(task) = self.echo.take() {
            task.abort();
        }
    }
}

pub fn lock(proxies: &SharedProxies) -> std::sync::MutexGuard<'_, Vec<Arc<ProxyDevice>>> {
    proxies.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn wait_for(flag: Arc<AtomicBool>) {
    while !flag.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn cmd_help() {
    println!();
    println!("{}", "Teleop Commands".bold().underline());
    println!("  {}                     – list proxied arms", "/arms".bold().cyan());
    println!("  {}               – switch or add the active arm", "/arm <name>".bold().cyan());
    println!("  {}                – set device position", "/pos x y z".bold().cyan());
    println!("  {}                – set orientation from roll/pitch/yaw", "/rpy r p y".bold().cyan());
    println!("  {}             – set orientation from a quaternion", "/quat x y z w".bold().cyan());
    println!("  {}  – publish a device twist", "/twist vx vy vz wx wy wz".bold().cyan());
    println!("  {}                 – publish a gripper opening (0..1)", "/gripper a".bold().cyan());
    println!("  {}                   – publish status once", "/status".bold().cyan());
    println!("  {}                    – show the commanded force", "/force".bold().cyan());
    println!("  {}                     – show raw and remapped pose", "/pose".bold().cyan());
    println!("  {}                    – roll/pitch/yaw sweep", "/sweep".bold().cyan());
    println!("  {}                     – toggle traffic echo", "/echo".bold().cyan());
    println!("  {}                   – list bus topics", "/topics".bold().cyan());
    println!("  {}              – exit", "/quit  /exit".bold().cyan());
    println!();
}
