//! The out-of-process UI for DSSI plugins. DSSI hosts start the UI as a separate executable and
//! pass it the host's OSC URL. The UI then announces itself with an `/update` message, receives the
//! plugin's current values, and sends the user's edits back to the host, which forwards them to
//! the plugin.

use clap::{error::ErrorKind, CommandFactory, FromArgMatches, Parser};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::osc::{OscArg, OscError, OscMessage, OscUrl};
use crate::context::PluginApi;
use crate::plugin::Plugin;
use crate::program::PROGRAMS_PER_BANK;
use crate::ui::{Ui, UiAdapter, UiConfig, UiEvent, UiHost, IDLE_INTERVAL};
use crate::wrapper::adapter::PluginInfo;
use crate::wrapper::block::{PortKind, PortLayout};
use crate::wrapper::util::setup_logger;

/// The sample rate the UI is created with if the host never sent one.
const FALLBACK_SAMPLE_RATE: f64 = 44100.0;

/// Configuration for the UI executable. The positional arguments are the ones every DSSI host
/// passes. The handshake budget has a hidden option, the other fields can only be changed when
/// calling [`run()`] directly.
#[derive(Debug, Clone, Parser)]
#[clap(about = None, long_about = None)]
pub struct RemoteUiConfig {
    /// The host's OSC URL, e.g. 'osc.udp://localhost:19383/dssi/plugin.so/label/1'.
    #[clap(value_parser)]
    pub osc_url: String,
    /// The path to the plugin's shared library.
    #[clap(value_parser)]
    pub plugin_binary: String,
    /// The plugin's LADSPA label.
    #[clap(value_parser)]
    pub plugin_label: String,
    /// A name for this plugin instance, used as the window title.
    #[clap(value_parser)]
    pub instance_name: String,

    /// How often to wait for the host's first message before giving up.
    #[clap(long, value_parser, default_value_t = 1000, hide = true)]
    pub handshake_attempts: u32,
    /// How long every handshake attempt waits for a message.
    #[clap(skip = Duration::from_millis(50))]
    pub handshake_interval: Duration,
    #[clap(skip = IDLE_INTERVAL)]
    pub idle_interval: Duration,
}

#[derive(Debug, Error)]
pub enum RemoteUiError {
    #[error(transparent)]
    Url(#[from] OscError),
    #[error("could not resolve the host's address '{0}'")]
    UnresolvedHost(String),
    #[error("could not set up the OSC socket: {0}")]
    Socket(#[from] io::Error),
    #[error("the host did not respond after {0} attempts")]
    HandshakeTimeout(u32),
}

/// Run the DSSI UI for `P` using the command line arguments the host passed to this executable.
/// This blocks until either the host or the UI closes the UI. Create a binary for the plugin's UI
/// that calls this function:
///
/// ```ignore
/// // src/bin/plugin_name_ui.rs
///
/// use plugin_name::PluginName;
///
/// fn main() {
///     if !hostbridge::wrapper::dssi::remote::hb_run_remote_ui::<PluginName>() {
///         std::process::exit(1);
///     }
/// }
/// ```
///
/// Returns `false` if the arguments were invalid or if the host could not be reached.
pub fn hb_run_remote_ui<P: Plugin>() -> bool {
    hb_run_remote_ui_with_args::<P, _>(std::env::args())
}

/// The same as [`hb_run_remote_ui()`], but with the arguments taken from an iterator instead of
/// using [`std::env::args()`].
pub fn hb_run_remote_ui_with_args<P: Plugin, Args: IntoIterator<Item = String>>(
    args: Args,
) -> bool {
    setup_logger();

    let config = match RemoteUiConfig::command()
        .name(P::NAME)
        .author(P::MAKER)
        .try_get_matches_from(args)
        .and_then(|matches| RemoteUiConfig::from_arg_matches(&matches))
    {
        Ok(config) => config,
        Err(err) => {
            let _ = err.print();
            return matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion);
        }
    };

    match run::<P>(&config) {
        Ok(()) => true,
        Err(err) => {
            hb_error!("{}", err);
            false
        }
    }
}

/// Connect to the host, wait for the handshake to complete, and then run the UI until it gets
/// closed.
pub fn run<P: Plugin>(config: &RemoteUiConfig) -> Result<(), RemoteUiError> {
    let url = OscUrl::parse(&config.osc_url)?;
    let host_addr = (url.host.as_str(), url.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| RemoteUiError::UnresolvedHost(url.to_string()))?;

    let bind_addr: SocketAddr = if host_addr.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(bind_addr)?;
    // This also makes `local_addr()` return the address the host can reach us on
    socket.connect(host_addr)?;
    let local_addr = socket.local_addr()?;
    let own_url = OscUrl {
        host: local_addr.ip().to_string(),
        port: local_addr.port(),
        path: url.path.clone(),
    };
    hb_trace!("Announcing '{}' to the host at '{}'", own_url, url);

    let host = Arc::new(OscHost {
        socket,
        url,
        layout: PortLayout::dssi::<P>(),
    });
    let mut session = RemoteSession::<P::Ui>::new(
        host.clone(),
        host.url.clone(),
        PluginInfo::describe::<P>(),
        PortLayout::dssi::<P>(),
    );

    host.send(OscMessage::new(host.url.method("update")).with_arg(OscArg::String(own_url.to_string())));

    host.socket.set_read_timeout(Some(config.handshake_interval))?;
    let mut buffer = vec![0u8; 65536];
    for _ in 0..config.handshake_attempts {
        match host.socket.recv(&mut buffer) {
            Ok(len) => session.receive(&buffer[..len]),
            Err(err) if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(err) => {
                // Connected UDP sockets report ICMP errors, for instance when the host is not
                // listening yet
                hb_trace!("Error while waiting for the host: {}", err);
                std::thread::sleep(config.handshake_interval);
            }
        }

        if session.is_ready() || session.host_closed {
            break;
        }
    }

    if session.host_closed {
        return Ok(());
    }
    if !session.is_ready() {
        return Err(RemoteUiError::HandshakeTimeout(config.handshake_attempts));
    }

    session.start();
    host.socket.set_nonblocking(true)?;
    loop {
        while let Ok(len) = host.socket.recv(&mut buffer) {
            session.receive(&buffer[..len]);
        }
        if session.host_closed {
            break;
        }

        if session.idle() {
            host.send(OscMessage::new(host.url.method("exiting")));
            break;
        }

        std::thread::sleep(config.idle_interval);
    }

    Ok(())
}

/// Sends the UI's edits to the host.
struct OscHost {
    /// Connected to the host's address.
    socket: UdpSocket,
    url: OscUrl,
    layout: PortLayout,
}

impl OscHost {
    fn send(&self, message: OscMessage) {
        if let Err(err) = self.socket.send(&message.encode()) {
            hb_warn!("Could not send '{}' to the host: {}", message.path, err);
        }
    }
}

impl UiHost for OscHost {
    fn edit_parameter(&self, _index: u32, _started: bool) {
        // DSSI has no notion of automation gestures
    }

    fn set_parameter_value(&self, index: u32, value: f32) {
        self.send(
            OscMessage::new(self.url.method("control"))
                .with_arg(OscArg::Int(self.layout.parameter_port(index) as i32))
                .with_arg(OscArg::Float(value)),
        );
    }

    fn set_state(&self, key: &str, value: &str) {
        self.send(
            OscMessage::new(self.url.method("configure"))
                .with_arg(OscArg::String(key.to_owned()))
                .with_arg(OscArg::String(value.to_owned())),
        );
    }

    fn send_note(&self, channel: u8, note: u8, velocity: u8) {
        let status = if velocity > 0 { 0x90 } else { 0x80 };
        self.send(
            OscMessage::new(self.url.method("midi"))
                .with_arg(OscArg::Midi([0, status | channel, note, velocity])),
        );
    }

    fn resize(&self, _width: u32, _height: u32) {
        // The UI owns its window, so there's nobody to ask
    }
}

/// A message from the host, with the host's URL path already stripped off.
#[derive(Debug, Clone, PartialEq)]
enum HostMessage {
    Control { port: u32, value: f32 },
    Program(u32),
    Configure(String, String),
    Midi([u8; 4]),
    SampleRate(f64),
    Show,
    Hide,
    Quit,
}

impl HostMessage {
    fn parse(message: &OscMessage, url: &OscUrl) -> Option<Self> {
        let method = message
            .path
            .strip_prefix(url.path.as_str())?
            .strip_prefix('/')?;

        match (method, message.type_tags().as_str()) {
            ("control", "if") => Some(HostMessage::Control {
                port: u32::try_from(message.int(0)?).ok()?,
                value: message.float(1)?,
            }),
            ("program", "ii") => {
                let bank = u32::try_from(message.int(0)?).ok()?;
                let program = u32::try_from(message.int(1)?).ok()?;
                Some(HostMessage::Program(
                    bank.checked_mul(PROGRAMS_PER_BANK)?.checked_add(program)?,
                ))
            }
            ("configure", "ss") => Some(HostMessage::Configure(
                message.string(0)?.to_owned(),
                message.string(1)?.to_owned(),
            )),
            ("midi", "m") => Some(HostMessage::Midi(message.midi(0)?)),
            ("sample-rate", "i") => Some(HostMessage::SampleRate(message.int(0)? as f64)),
            ("show", "") => Some(HostMessage::Show),
            ("hide", "") => Some(HostMessage::Hide),
            ("quit", "") => Some(HostMessage::Quit),
            _ => None,
        }
    }
}

/// The UI side of the OSC protocol, independent of the socket.
struct RemoteSession<U: Ui> {
    host: Arc<dyn UiHost>,
    info: PluginInfo,
    layout: PortLayout,

    sample_rate: Option<f64>,
    /// Messages received before the UI was created, replayed in order by `start()`.
    pending: Vec<HostMessage>,
    ui: Option<UiAdapter<U>>,
    host_closed: bool,

    /// Only used to strip the host's path from incoming messages.
    url: OscUrl,
}

impl<U: Ui> RemoteSession<U> {
    fn new(host: Arc<dyn UiHost>, url: OscUrl, info: PluginInfo, layout: PortLayout) -> Self {
        Self {
            host,
            info,
            layout,

            sample_rate: None,
            pending: Vec::new(),
            ui: None,
            host_closed: false,

            url,
        }
    }

    /// The handshake is complete once the host sent its sample rate, or anything the UI would
    /// have to act on.
    fn is_ready(&self) -> bool {
        self.sample_rate.is_some() || !self.pending.is_empty()
    }

    fn receive(&mut self, packet: &[u8]) {
        let message = match OscMessage::decode(packet) {
            Ok(message) => message,
            Err(err) => {
                hb_warn!("Ignoring a malformed OSC packet: {}", err);
                return;
            }
        };

        match HostMessage::parse(&message, &self.url) {
            Some(message) => self.handle(message),
            None => hb_trace!("Ignoring unknown OSC message '{}'", message.path),
        }
    }

    fn handle(&mut self, message: HostMessage) {
        match message {
            HostMessage::SampleRate(sample_rate) => self.sample_rate = Some(sample_rate),
            HostMessage::Control { port, value }
                if self.layout.kind(port) == Some(PortKind::SampleRate) =>
            {
                self.sample_rate = Some(value as f64)
            }
            HostMessage::Quit => self.host_closed = true,
            message => match &mut self.ui {
                Some(ui) => Self::deliver(ui, &self.layout, message),
                None => self.pending.push(message),
            },
        }
    }

    /// Create the UI and replay everything that was received during the handshake.
    fn start(&mut self) {
        if self.ui.is_some() {
            return;
        }

        let mut ui = UiAdapter::new(
            self.host.clone(),
            None,
            UiConfig {
                plugin_api: PluginApi::Dssi,
                parameter_count: self.info.parameters.len() as u32,
                sample_rate: self.sample_rate.unwrap_or(FALLBACK_SAMPLE_RATE),
                parent_window: None,
            },
        );
        for message in self.pending.drain(..) {
            Self::deliver(&mut ui, &self.layout, message);
        }

        self.ui = Some(ui);
    }

    /// Idle the UI. Returns whether the UI asked to be closed.
    fn idle(&mut self) -> bool {
        match &mut self.ui {
            Some(ui) => {
                ui.idle();
                ui.is_close_requested()
            }
            None => false,
        }
    }

    fn deliver(ui: &mut UiAdapter<U>, layout: &PortLayout, message: HostMessage) {
        match message {
            HostMessage::Control { port, value } => match layout.kind(port) {
                Some(PortKind::Parameter(index)) => ui.parameter_changed(index, value),
                _ => hb_trace!("Ignoring a control message for port {}", port),
            },
            HostMessage::Program(index) => ui.program_changed(index),
            HostMessage::Configure(key, value) => ui.state_changed(&key, &value),
            HostMessage::Midi([_, status, note, velocity]) => {
                let channel = status & 0x0f;
                match status & 0xf0 {
                    0x80 => ui.note_received(channel, note, 0),
                    0x90 => ui.note_received(channel, note, velocity),
                    _ => (),
                }
            }
            HostMessage::Show => {
                ui.on_event(UiEvent::Show);
            }
            HostMessage::Hide => {
                ui.on_event(UiEvent::Hide);
            }
            HostMessage::SampleRate(_) | HostMessage::Quit => (),
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::test_plugin::RecordingPlugin;
    use crate::ui::UiHandle;

    struct NullHost;

    impl UiHost for NullHost {
        fn edit_parameter(&self, _index: u32, _started: bool) {}
        fn set_parameter_value(&self, _index: u32, _value: f32) {}
        fn set_state(&self, _key: &str, _value: &str) {}
        fn send_note(&self, _channel: u8, _note: u8, _velocity: u8) {}
        fn resize(&self, _width: u32, _height: u32) {}
    }

    lazy_static::lazy_static! {
        static ref SEEN: Mutex<Vec<String>> = Mutex::new(Vec::new());
    }

    struct LoggingUi;

    impl Ui for LoggingUi {
        fn new(handle: UiHandle) -> Self {
            SEEN.lock().push(format!("new {}", handle.sample_rate()));
            LoggingUi
        }

        fn width(&self) -> u32 {
            100
        }

        fn height(&self) -> u32 {
            100
        }

        fn on_event(&mut self, event: UiEvent) -> bool {
            SEEN.lock().push(format!("{:?}", event));
            true
        }

        fn parameter_changed(&mut self, index: u32, value: f32) {
            SEEN.lock().push(format!("parameter {} {}", index, value));
        }

        fn program_changed(&mut self, index: u32) {
            SEEN.lock().push(format!("program {}", index));
        }

        fn note_received(&mut self, channel: u8, note: u8, velocity: u8) {
            SEEN.lock().push(format!("note {} {} {}", channel, note, velocity));
        }
    }

    fn url() -> OscUrl {
        OscUrl::parse("osc.udp://127.0.0.1:1234/dssi/test").unwrap()
    }

    fn make_session() -> RemoteSession<LoggingUi> {
        RemoteSession::new(
            Arc::new(NullHost),
            url(),
            PluginInfo::describe::<RecordingPlugin>(),
            PortLayout::dssi::<RecordingPlugin>(),
        )
    }

    fn packet(message: OscMessage) -> Vec<u8> {
        message.encode()
    }

    #[test]
    fn parses_host_messages() {
        let url = url();
        assert_eq!(
            HostMessage::parse(
                &OscMessage::new("/dssi/test/program")
                    .with_arg(OscArg::Int(1))
                    .with_arg(OscArg::Int(2)),
                &url
            ),
            Some(HostMessage::Program(130))
        );
        assert_eq!(
            HostMessage::parse(&OscMessage::new("/dssi/test/show"), &url),
            Some(HostMessage::Show)
        );
        // Wrong type tags and foreign paths are ignored
        assert_eq!(
            HostMessage::parse(
                &OscMessage::new("/dssi/test/control").with_arg(OscArg::Int(1)),
                &url
            ),
            None
        );
        assert_eq!(HostMessage::parse(&OscMessage::new("/other/show"), &url), None);
    }

    #[test]
    fn messages_are_buffered_until_start() {
        SEEN.lock().clear();
        let mut session = make_session();
        assert!(!session.is_ready());

        session.receive(&packet(
            OscMessage::new("/dssi/test/sample-rate").with_arg(OscArg::Int(48000)),
        ));
        assert!(session.is_ready());

        // Port 5 is the first parameter, port 4 is the latency port
        session.receive(&packet(
            OscMessage::new("/dssi/test/control")
                .with_arg(OscArg::Int(5))
                .with_arg(OscArg::Float(0.25)),
        ));
        session.receive(&packet(
            OscMessage::new("/dssi/test/control")
                .with_arg(OscArg::Int(4))
                .with_arg(OscArg::Float(64.0)),
        ));
        session.receive(&packet(
            OscMessage::new("/dssi/test/midi").with_arg(OscArg::Midi([0, 0x91, 60, 0])),
        ));
        session.receive(&packet(OscMessage::new("/dssi/test/show")));
        assert!(SEEN.lock().is_empty());

        session.start();
        session.receive(&packet(
            OscMessage::new("/dssi/test/program")
                .with_arg(OscArg::Int(0))
                .with_arg(OscArg::Int(1)),
        ));
        assert_eq!(
            *SEEN.lock(),
            [
                "new 48000",
                "parameter 0 0.25",
                "note 1 60 0",
                "Show",
                "program 1"
            ]
        );

        session.receive(&packet(OscMessage::new("/dssi/test/quit")));
        assert!(session.host_closed);
    }

    #[test]
    fn handshake_times_out() {
        // The host receives the `/update` message but never answers
        let silent_host = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = silent_host.local_addr().unwrap().port();

        let config = RemoteUiConfig {
            osc_url: format!("osc.udp://127.0.0.1:{port}/dssi/test"),
            plugin_binary: String::from("test.so"),
            plugin_label: String::from("recording"),
            instance_name: String::from("test"),
            handshake_attempts: 3,
            handshake_interval: Duration::from_millis(10),
            idle_interval: IDLE_INTERVAL,
        };

        let result = run::<RecordingPlugin>(&config);
        assert!(matches!(result, Err(RemoteUiError::HandshakeTimeout(3))));

        let mut buffer = [0u8; 512];
        silent_host
            .set_read_timeout(Some(Duration::from_secs(1)))
            .unwrap();
        let len = silent_host.recv(&mut buffer).unwrap();
        let update = OscMessage::decode(&buffer[..len]).unwrap();
        assert_eq!(update.path, "/dssi/test/update");
    }

    #[test]
    fn unanswered_handshake_fails() {
        let silent_host = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = silent_host.local_addr().unwrap().port();

        assert!(!hb_run_remote_ui_with_args::<RecordingPlugin, _>(vec![
            String::from("recording-ui"),
            format!("osc.udp://127.0.0.1:{port}/dssi/test"),
            String::from("test.so"),
            String::from("recording"),
            String::from("test"),
            String::from("--handshake-attempts=2"),
        ]));
    }

    #[test]
    fn missing_arguments() {
        assert!(!hb_run_remote_ui_with_args::<RecordingPlugin, _>(vec![
            String::from("recording-ui"),
            String::from("osc.udp://127.0.0.1:1234/dssi/test"),
        ]));
    }
}
