//! `cid` command - builds tracking identifiers and pixel URLs for senders

use anyhow::{bail, Result};
use clap::Args;

use crate::codec::TrackingIdentifier;

const DEFAULT_BASE_URL: &str = "http://localhost:3000";

#[derive(Args, Debug)]
pub struct CidArgs {
    /// Company the email was sent to
    #[arg(long)]
    pub company: String,

    /// Recipient email address
    #[arg(long)]
    pub email: String,

    /// Email subject line
    #[arg(long)]
    pub subject: String,

    /// Email type, e.g. "Initial" or "Follow Up 1"
    #[arg(long = "type", value_name = "TYPE")]
    pub email_type: String,

    /// Sent time (RFC 3339 or epoch milliseconds)
    #[arg(long)]
    pub sent_time: Option<String>,

    /// Public base URL of the pixel service (default: http://localhost:3000)
    #[arg(long)]
    pub base_url: Option<String>,
}

impl CidArgs {
    pub fn run(self) -> Result<()> {
        let link = self.build()?;
        println!("CID: {}", link.cid);
        println!("Pixel URL: {}", link.url);
        println!();
        println!("HTML:");
        println!(
            "  <img src=\"{}\" width=\"1\" height=\"1\" alt=\"\" style=\"display:none\">",
            link.url
        );
        Ok(())
    }

    pub fn build(&self) -> Result<PixelLink> {
        let fields = [
            ("--company", &self.company),
            ("--email", &self.email),
            ("--subject", &self.subject),
            ("--type", &self.email_type),
        ];
        for (flag, value) in fields {
            if value.contains('|') {
                bail!("{} must not contain '|', it separates identifier fields", flag);
            }
        }

        let identifier = TrackingIdentifier::new(
            self.company.as_str(),
            self.email.as_str(),
            self.subject.as_str(),
            self.email_type.as_str(),
            self.sent_time.clone().filter(|s| !s.trim().is_empty()),
        );
        let cid = identifier.encode();
        let url = pixel_url(self.base_url.as_deref(), &cid);
        Ok(PixelLink { cid, url })
    }
}

/// An encoded identifier and the URL that records it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelLink {
    pub cid: String,
    pub url: String,
}

/// Full pixel URL for `cid` under `base_url`, or the local default.
pub fn pixel_url(base_url: Option<&str>, cid: &str) -> String {
    let base = base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');
    format!("{}/open?cid={}", base, cid)
}
