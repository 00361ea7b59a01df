//! Telegram Bot API delivery backend

use std::io::Write;
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use tracing::debug;

use crate::utils::encode_jpeg;

use super::{Notice, Notifier};

const API_BASE: &str = "https://api.telegram.org";

pub struct TelegramNotifier {
    token: String,
    chat_id: String,
    agent: ureq::Agent,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            chat_id: chat_id.into(),
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(20))
                .build(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{API_BASE}/bot{}/{method}", self.token)
    }

    fn check_response(body: &str) -> Result<()> {
        let value: serde_json::Value = serde_json::from_str(body)?;
        if value["ok"].as_bool().unwrap_or(false) {
            Ok(())
        } else {
            Err(eyre!("telegram API rejected the request: {body}"))
        }
    }

    fn send_message(&self, text: &str) -> Result<()> {
        let response = self
            .agent
            .post(&self.method_url("sendMessage"))
            .send_form(&[("chat_id", self.chat_id.as_str()), ("text", text)])?;
        Self::check_response(&response.into_string()?)
    }

    fn send_photo(&self, caption: &str, jpeg: &[u8]) -> Result<()> {
        let boundary = format!("overwatch{:016x}", std::process::id() as u64 ^ jpeg.len() as u64);
        let mut body = Vec::with_capacity(jpeg.len() + 512);

        write!(body, "--{boundary}\r\n")?;
        write!(
            body,
            "Content-Disposition: form-data; name=\"chat_id\"\r\n\r\n{}\r\n",
            self.chat_id
        )?;
        write!(body, "--{boundary}\r\n")?;
        write!(
            body,
            "Content-Disposition: form-data; name=\"caption\"\r\n\r\n{caption}\r\n"
        )?;
        write!(body, "--{boundary}\r\n")?;
        write!(
            body,
            "Content-Disposition: form-data; name=\"photo\"; filename=\"detection.jpg\"\r\n\
             Content-Type: image/jpeg\r\n\r\n"
        )?;
        body.extend_from_slice(jpeg);
        write!(body, "\r\n--{boundary}--\r\n")?;

        let response = self
            .agent
            .post(&self.method_url("sendPhoto"))
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={boundary}"),
            )
            .send_bytes(&body)?;
        Self::check_response(&response.into_string()?)
    }
}

impl Notifier for TelegramNotifier {
    fn notify(&mut self, notice: &Notice) -> Result<()> {
        match notice {
            Notice::Text { text, .. } => self.send_message(text),
            Notice::DetectionFrame { camera, frame, .. } => {
                debug!(%camera, sequence = frame.sequence(), "sending detection frame");
                let jpeg = encode_jpeg(frame)?;
                self.send_photo(camera, &jpeg)
            }
            Notice::CameraFailure {
                camera, timeouts, ..
            } => self.send_message(&format!("camera {camera} has failed {timeouts} times")),
        }
    }
}
