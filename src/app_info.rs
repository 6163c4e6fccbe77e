// Process-wide application metadata

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AppInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub author: &'static str,
    pub donation_email: &'static str,
}

pub const APP_INFO: AppInfo = AppInfo {
    name: "YouTube to MP3",
    version: env!("CARGO_PKG_VERSION"),
    author: "Sponex",
    donation_email: "viorelstanculet1234@outlook.com",
};

impl AppInfo {
    /// PayPal donate link for the donation address.
    pub fn donate_url(&self) -> String {
        reqwest::Url::parse_with_params(
            "https://www.paypal.com/donate",
            &[
                ("business", self.donation_email),
                ("no_recurring", "0"),
                ("currency_code", "USD"),
            ],
        )
        .map(String::from)
        .unwrap_or_else(|_| "https://www.paypal.com/donate".to_string())
    }

    pub fn window_title(&self) -> String {
        format!("{} v{}", self.name, self.version)
    }

    /// Status bar line: version, author and donation address.
    pub fn status_line(&self) -> String {
        format!(
            "v{} • Made by {} • PayPal: {}",
            self.version, self.author, self.donation_email
        )
    }
}
