mod app;
mod crop;
mod launch;
mod renderer;
mod search;
mod session;
mod state;
mod upload;
mod vial;

fn main() -> eframe::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli_args = std::env::args().skip(1).collect::<Vec<_>>();
    if cli_args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("{}", launch::USAGE);
        return Ok(());
    }

    let env_server = std::env::var(launch::SERVER_URL_ENV).ok();
    let (config, initial_status) = match launch::parse_launch_config_from_args(&cli_args, env_server)
    {
        Ok(config) => (config, None),
        Err(err) => {
            log::warn!("{err}");
            (
                launch::LaunchConfig::default(),
                Some(format!("Launch args error: {err}")),
            )
        }
    };
    log::info!(
        "Starting Vial Finder v{} against {}",
        env!("CARGO_PKG_VERSION"),
        config.server_url
    );

    let native_options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 820.0])
            .with_min_inner_size([480.0, 360.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Vial Finder",
        native_options,
        Box::new(move |_cc| Ok(Box::new(app::VialFinderApp::new(config, initial_status)))),
    )
}
