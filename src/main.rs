// Prevents additional console window on Windows in release, DO NOT REMOVE!!
#![cfg_attr(
    all(not(debug_assertions), feature = "desktop"),
    windows_subsystem = "windows"
)]

fn main() {
    #[cfg(feature = "desktop")]
    {
        pushcount_lib::run();
    }

    #[cfg(not(feature = "desktop"))]
    {
        if let Err(err) = pushcount_lib::replay::run_headless(std::env::args().skip(1)) {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}
