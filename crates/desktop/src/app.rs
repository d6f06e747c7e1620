//! ADK Chat Desktop: egui app state and UI.

use adkchat::session::short_id;
use adkchat::{
    BackendError, ChatController, ConnectionState, FileStore, Message, SendOutcome,
};
use eframe::egui;
use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

const LOG_BUFFER_MAX_LINES: usize = 2000;
const TOAST_DURATION: Duration = Duration::from_secs(3);
const BUBBLE_MAX_WIDTH_FRACTION: f32 = 0.8;

/// Ring buffer of log lines for the Logs screen. Written by DesktopLogger.
static LOG_LINES: OnceLock<Mutex<VecDeque<String>>> = OnceLock::new();

fn log_buffer() -> &'static Mutex<VecDeque<String>> {
    LOG_LINES.get_or_init(|| Mutex::new(VecDeque::new()))
}

fn push_log_line(line: String) {
    if let Ok(mut buf) = log_buffer().lock() {
        buf.push_back(line);
        while buf.len() > LOG_BUFFER_MAX_LINES {
            buf.pop_front();
        }
    }
}

/// Logger that appends to LOG_LINES for display in the Logs screen.
struct DesktopLogger;

impl log::Log for DesktopLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Debug
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "{} [{}] {}: {}",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        );
        push_log_line(line);
    }

    fn flush(&self) {}
}

static LOGGER: DesktopLogger = DesktopLogger;

/// Route `log` records into the Logs screen buffer.
pub fn install_logger() {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(log::LevelFilter::Debug);
}

/// Prompts offered on the welcome screen: (text, caption).
const QUICK_MESSAGES: [(&str, &str); 4] = [
    ("✨ Hi, who are you?", "Introduction"),
    ("💬 Greet me by the name John", "Personal greeting"),
    ("⛅ What's the weather in Jakarta?", "Weather info"),
    ("🧮 Calculate 25 * 4", "Calculation"),
];

/// Feature blurbs on the welcome screen: (icon, title, description).
const FEATURES: [(&str, &str, &str); 3] = [
    ("⚡", "Fast Response", "Powered by Gemini 2.0 Flash"),
    ("🛡", "Secure", "Your conversations are private"),
    ("✨", "Intelligent", "Context-aware responses"),
];

#[derive(Clone, Copy, PartialEq, Eq, Default)]
enum Screen {
    #[default]
    Chat,
    Logs,
}

struct Toast {
    text: String,
    is_error: bool,
    shown_at: Instant,
}

pub struct ChatApp {
    /// Session, history, and send state. Declared before `runtime` so the health monitor
    /// is aborted before the runtime shuts down.
    controller: ChatController<FileStore>,
    /// Runs chat requests and the health monitor off the UI thread.
    runtime: tokio::runtime::Runtime,
    /// When Some, a chat turn is in flight; we read the result here.
    chat_turn_receiver: Option<mpsc::Receiver<Result<String, BackendError>>>,
    /// Set when the session could not be restored or created; sending stays disabled.
    init_error: Option<String>,
    /// Last notification shown in the status bar.
    toast: Option<Toast>,
    /// True while the clear-history confirmation is open.
    confirm_clear: bool,
    dark_mode: bool,
    current_screen: Screen,
    /// Give the input focus on the next frame (after a send or a quick action).
    focus_input: bool,
}

impl ChatApp {
    /// Space between the main screen title and the content below.
    const SCREEN_TITLE_BOTTOM_SPACING: f32 = 18.0;
    /// Space between the bottom of the content and the window edge.
    const SCREEN_FOOTER_SPACING: f32 = 24.0;

    pub fn new(
        cc: &eframe::CreationContext<'_>,
        runtime: tokio::runtime::Runtime,
        config: adkchat::config::Config,
        config_path: std::path::PathBuf,
    ) -> Self {
        let mut controller = adkchat::open_controller(&config, &config_path);

        let mut app_toast = None;
        let init_error = match controller.initialize() {
            Ok((id, history)) => {
                log::info!("session {} ready, {} message(s)", id, history.len());
                None
            }
            Err(e) => {
                log::error!("error initializing session: {}", e);
                app_toast = Some(Toast {
                    text: "Failed to initialize session".to_string(),
                    is_error: true,
                    shown_at: Instant::now(),
                });
                Some(e.to_string())
            }
        };

        {
            let _guard = runtime.enter();
            controller.start_health_monitor(config.api.health_interval());
        }

        // Repaint whenever a probe lands so the badge updates without input events.
        let mut states = controller.subscribe_connection();
        let ctx = cc.egui_ctx.clone();
        runtime.spawn(async move {
            while states.changed().await.is_ok() {
                ctx.request_repaint();
            }
        });

        Self {
            controller,
            runtime,
            chat_turn_receiver: None,
            init_error,
            toast: app_toast,
            confirm_clear: false,
            dark_mode: false,
            current_screen: Screen::default(),
            focus_input: true,
        }
    }

    fn show_toast(&mut self, text: &str, is_error: bool) {
        self.toast = Some(Toast {
            text: text.to_string(),
            is_error,
            shown_at: Instant::now(),
        });
    }

    fn can_send(&self) -> bool {
        self.init_error.is_none() && self.controller.can_send(self.controller.input())
    }

    /// Start a chat turn on the runtime if the input is sendable.
    fn start_chat_turn(&mut self, ctx: &egui::Context) {
        let text = self.controller.input().to_string();
        let request = match self.controller.begin_send(&text) {
            Ok(r) => r,
            Err(e) => {
                log::debug!("send not started: {}", e);
                return;
            }
        };
        let backend = self.controller.backend();
        let (tx, rx) = mpsc::channel();
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let result = backend.chat(&request).await;
            let _ = tx.send(result);
            ctx.request_repaint();
        });
        self.chat_turn_receiver = Some(rx);
        self.focus_input = true;
    }

    /// Poll for chat turn result and clear receiver when done. Call each frame.
    fn poll_chat_turn(&mut self) {
        let Some(rx) = &self.chat_turn_receiver else {
            return;
        };
        let result = match rx.try_recv() {
            Ok(result) => result,
            Err(mpsc::TryRecvError::Empty) => return,
            Err(mpsc::TryRecvError::Disconnected) => Err(BackendError::Decode(
                "request task ended without a response".to_string(),
            )),
        };
        self.chat_turn_receiver = None;
        match self.controller.finish_send(result) {
            SendOutcome::Replied(_) => self.show_toast("Message sent successfully", false),
            SendOutcome::Failed(_) => self.show_toast("Failed to send message", true),
        }
    }

    fn clear_chat(&mut self) {
        match self.controller.clear() {
            Ok(Some(_)) => self.show_toast("Chat history cleared", false),
            Ok(None) => {}
            Err(e) => {
                log::error!("failed to clear chat: {}", e);
                self.show_toast("Failed to clear chat history", true);
            }
        }
    }

    fn badge_color(state: ConnectionState) -> egui::Color32 {
        match state {
            ConnectionState::Checking => egui::Color32::GRAY,
            ConnectionState::Connected => egui::Color32::from_rgb(34, 160, 90),
            ConnectionState::AdkDisconnected => egui::Color32::from_rgb(214, 150, 20),
            ConnectionState::Disconnected => egui::Color32::from_rgb(210, 60, 60),
        }
    }

    /// Renders one chat bubble: user on the right, agent on the left, errors tinted red.
    fn render_chat_message(ui: &mut egui::Ui, m: &Message) {
        let visuals = ui.style().visuals.clone();
        let error_color = visuals.error_fg_color;
        let fill = if m.is_user() {
            visuals.selection.bg_fill
        } else if m.is_error {
            error_color.linear_multiply(0.12)
        } else {
            visuals.faint_bg_color
        };
        let stroke_color = if m.is_error {
            error_color.linear_multiply(0.5)
        } else {
            visuals.widgets.noninteractive.bg_stroke.color
        };
        let layout = if m.is_user() {
            egui::Layout::top_down(egui::Align::Max)
        } else {
            egui::Layout::top_down(egui::Align::Min)
        };
        let max_width = ui.available_width() * BUBBLE_MAX_WIDTH_FRACTION;

        ui.with_layout(layout, |ui| {
            egui::Frame::none()
                .fill(fill)
                .stroke(egui::Stroke::new(1.0, stroke_color))
                .rounding(egui::Rounding::same(8.0))
                .inner_margin(egui::Margin::symmetric(12.0, 8.0))
                .show(ui, |ui| {
                    ui.set_max_width(max_width);
                    if m.is_error {
                        ui.label(egui::RichText::new("⚠ Error").small().strong().color(error_color));
                        ui.add_space(4.0);
                        ui.label(egui::RichText::new(&m.text).color(error_color));
                    } else if m.is_user() {
                        ui.label(egui::RichText::new(&m.text).color(visuals.selection.stroke.color));
                    } else {
                        ui.label(&m.text);
                    }
                });
            ui.label(egui::RichText::new(m.time_label()).small().weak());
        });
    }

    fn ui_typing_indicator(ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.spinner();
            ui.label(egui::RichText::new("Agent is typing...").weak().italics());
        });
    }

    fn ui_welcome(&mut self, ui: &mut egui::Ui) {
        let state = self.controller.connection_state();
        ui.vertical_centered(|ui| {
            ui.add_space(24.0);
            ui.label(egui::RichText::new("🤖").size(48.0));
            ui.heading("👋 Welcome!");
            ui.label(egui::RichText::new("I'm an AI assistant ready to help you").weak());
            ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);

            ui.columns(FEATURES.len(), |cols| {
                for (col, (icon, title, description)) in cols.iter_mut().zip(FEATURES) {
                    col.vertical_centered(|ui| {
                        ui.label(egui::RichText::new(icon).size(20.0));
                        ui.label(egui::RichText::new(title).small().strong());
                        ui.label(egui::RichText::new(description).small().weak());
                    });
                }
            });

            if let Some(warning) = state.warning() {
                ui.add_space(12.0);
                ui.colored_label(Self::badge_color(state), warning);
            }

            ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);
            ui.label(egui::RichText::new("Quick Actions").strong());
            ui.label(egui::RichText::new("Ask something to get started").small().weak());
            ui.add_space(8.0);
            let enabled = state.is_connected();
            for (text, caption) in QUICK_MESSAGES {
                let button = egui::Button::new(format!("{}\n{}", text, caption))
                    .min_size(egui::vec2(280.0, 0.0));
                if ui.add_enabled(enabled, button).clicked() {
                    // Drop the leading icon; only the prompt goes into the input.
                    let prompt = text.split_once(' ').map(|(_, p)| p).unwrap_or(text);
                    self.controller.set_input(prompt);
                    self.focus_input = true;
                }
                ui.add_space(4.0);
            }
        });
    }

    fn ui_messages(&mut self, ui: &mut egui::Ui) {
        egui::ScrollArea::vertical()
            .stick_to_bottom(true)
            .auto_shrink([false, false])
            .show(ui, |ui| {
                if self.controller.history().is_empty() {
                    self.ui_welcome(ui);
                    return;
                }
                for m in self.controller.history() {
                    Self::render_chat_message(ui, m);
                    ui.add_space(8.0);
                }
                if self.controller.is_busy() {
                    Self::ui_typing_indicator(ui);
                }
            });
    }

    /// Input row and status bar.
    fn ui_input(&mut self, ui: &mut egui::Ui) {
        let ctx = ui.ctx().clone();
        let input_enabled = self.init_error.is_none() && !self.controller.is_busy();
        let mut submit = false;

        ui.add_space(8.0);
        ui.horizontal(|ui| {
            let send_width = 64.0;
            let edit = egui::TextEdit::singleline(self.controller.input_mut())
                .hint_text("Type your message...")
                .desired_width(ui.available_width() - send_width - 8.0);
            let response = ui.add_enabled(input_enabled, edit);
            if self.focus_input && input_enabled {
                response.request_focus();
                self.focus_input = false;
            }
            if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                submit = true;
            }
            let can_send = self.can_send();
            if ui
                .add_enabled(can_send, egui::Button::new("Send ➤").min_size(egui::vec2(send_width, 0.0)))
                .clicked()
            {
                submit = true;
            }
        });
        if submit {
            self.start_chat_turn(&ctx);
        }

        ui.add_space(6.0);
        ui.horizontal(|ui| {
            let state = self.controller.connection_state();
            let badge = match state {
                ConnectionState::Checking => format!("⟳ {}", state),
                ConnectionState::Connected => format!("● {}", state),
                _ => format!("⚠ {}", state),
            };
            ui.colored_label(Self::badge_color(state), egui::RichText::new(badge).small());

            if let Some(toast) = &self.toast {
                if toast.shown_at.elapsed() < TOAST_DURATION {
                    ui.add_space(12.0);
                    let text = egui::RichText::new(&toast.text).small();
                    if toast.is_error {
                        ui.colored_label(ui.visuals().error_fg_color, text);
                    } else {
                        ui.label(text.weak());
                    }
                    ctx.request_repaint_after(TOAST_DURATION);
                }
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if let Some(id) = self.controller.session_id() {
                    ui.label(
                        egui::RichText::new(format!("{}...", short_id(id)))
                            .small()
                            .family(egui::FontFamily::Monospace),
                    );
                }
            });
        });
        if let Some(err) = &self.init_error {
            ui.add_space(4.0);
            ui.colored_label(egui::Color32::RED, err);
        }
        ui.add_space(Self::SCREEN_FOOTER_SPACING);
    }

    fn ui_logs_screen(&self, ui: &mut egui::Ui) {
        ui.add_space(24.0);
        ui.heading("Logs");
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);
        let lines: Vec<String> = log_buffer()
            .lock()
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default();
        egui::ScrollArea::vertical()
            .stick_to_bottom(true)
            .auto_shrink([false, false])
            .show(ui, |ui| {
                if lines.is_empty() {
                    ui.label("No log output yet.");
                }
                for line in &lines {
                    ui.label(
                        egui::RichText::new(line.as_str()).family(egui::FontFamily::Monospace),
                    );
                }
            });
    }

    fn ui_confirm_clear(&mut self, ctx: &egui::Context) {
        if !self.confirm_clear {
            return;
        }
        let mut decision = None;
        egui::Window::new("Clear chat")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label("Delete all chat history?");
                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    if ui.button("Delete").clicked() {
                        decision = Some(true);
                    }
                    if ui.button("Cancel").clicked() {
                        decision = Some(false);
                    }
                });
            });
        if let Some(confirmed) = decision {
            self.confirm_clear = false;
            if confirmed {
                self.clear_chat();
            }
        }
    }
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_chat_turn();
        ctx.set_visuals(if self.dark_mode {
            egui::Visuals::dark()
        } else {
            egui::Visuals::light()
        });

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            egui::Frame::none()
                .inner_margin(egui::Margin::symmetric(24.0, 12.0))
                .show(ui, |ui| {
                    ui.horizontal(|ui| {
                        ui.vertical(|ui| {
                            ui.heading("🤖 ADK Chatbot");
                            ui.label(
                                egui::RichText::new("Powered by Gemini 2.0 Flash").small().weak(),
                            );
                        });
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            let clear_enabled = !self.controller.is_busy()
                                && self.init_error.is_none();
                            if ui
                                .add_enabled(clear_enabled, egui::Button::new("🗑"))
                                .on_hover_text("Clear Chat")
                                .clicked()
                            {
                                self.confirm_clear = true;
                            }
                            let theme_icon = if self.dark_mode { "☀" } else { "🌙" };
                            if ui.button(theme_icon).clicked() {
                                self.dark_mode = !self.dark_mode;
                            }
                            ui.add_space(8.0);
                            ui.selectable_value(&mut self.current_screen, Screen::Logs, "Logs");
                            ui.selectable_value(&mut self.current_screen, Screen::Chat, "Chat");
                        });
                    });
                });
        });

        if self.current_screen == Screen::Chat {
            egui::TopBottomPanel::bottom("input").show(ctx, |ui| {
                egui::Frame::none()
                    .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                    .show(ui, |ui| self.ui_input(ui));
            });
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::Frame::none()
                .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                .show(ui, |ui| match self.current_screen {
                    Screen::Chat => self.ui_messages(ui),
                    Screen::Logs => self.ui_logs_screen(ui),
                });
        });

        self.ui_confirm_clear(ctx);
    }
}
