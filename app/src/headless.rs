//! Host implementations for the standalone binary.
//!
//! The binary runs without a GUI shell, so the tray menu and the main
//! window reduce to log output. A shell embedding [`crate::app::App`]
//! replaces these with real tray/window integrations.

use crate::dispatch::WindowHandle;
use crate::tray::{LABEL_OPEN, LABEL_QUIT, MenuItem, MenuSpec, TrayHost};

pub struct HeadlessTray;

impl TrayHost for HeadlessTray {
    fn set_menu(&self, menu: &MenuSpec) {
        tracing::info!(items = menu.items.len(), "tray menu replaced");
        for item in &menu.items {
            match item {
                MenuItem::Open => tracing::debug!("menu: {LABEL_OPEN}"),
                MenuItem::Separator => {}
                MenuItem::Notice(label) => tracing::info!("menu: {label}"),
                MenuItem::Toggle { key, checked } => {
                    tracing::info!("menu: [{}] {key}", if *checked { "x" } else { " " });
                }
                MenuItem::Quit => tracing::debug!("menu: {LABEL_QUIT}"),
            }
        }
    }
}

pub struct HeadlessWindow;

impl WindowHandle for HeadlessWindow {
    fn focus(&self) {
        tracing::info!("main window focus requested");
    }
}
