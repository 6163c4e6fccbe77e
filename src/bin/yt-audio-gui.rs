// Prevents additional console window on Windows in release, DO NOT REMOVE!!
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

fn main() {
    yt_audio_lib::logging::init_tracing();
    yt_audio_lib::run()
}
