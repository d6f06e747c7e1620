//! ADK Chat Desktop: application entry.

mod app;

use eframe::egui;

fn main() -> anyhow::Result<()> {
    app::install_logger();
    log::info!("desktop started");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;
    let (config, config_path) = adkchat::config::load_config(None)?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 760.0])
            .with_min_inner_size([480.0, 480.0]),
        ..Default::default()
    };
    eframe::run_native(
        "ADK Chat",
        options,
        Box::new(move |cc| Box::new(app::ChatApp::new(cc, runtime, config, config_path))),
    )
    .map_err(|e| anyhow::anyhow!("desktop failed: {}", e))
}
