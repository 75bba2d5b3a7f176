//! Клиент сервера синтеза F5-TTS
//!
//! Сервер принимает multipart-запрос с референсной записью и параметрами
//! и возвращает WAV в теле ответа.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{multipart, Client};
use tokio::io::AsyncWriteExt;

use crate::config::EngineConfig;
use crate::error::{Result, TtsArticleError};
use crate::media::audio::AudioBuffer;
use crate::tts::engine::{SynthesisEngine, SynthesisRequest};

/// Движок, обращающийся к серверу синтеза по HTTP
pub struct HttpSynthesisEngine {
    client: Client,
    endpoint: String,
    ready: bool,
}

impl HttpSynthesisEngine {
    /// Создать новый экземпляр HttpSynthesisEngine
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            ready: false,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn build_form(request: &SynthesisRequest) -> Result<multipart::Form> {
        let audio = tokio::fs::read(&request.reference_audio).await.map_err(|e| {
            TtsArticleError::Synthesis(format!(
                "Failed to read reference audio {}: {}",
                request.reference_audio.display(),
                e
            ))
        })?;
        let file_name = request
            .reference_audio
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "reference.wav".to_string());

        let audio_part = multipart::Part::bytes(audio)
            .file_name(file_name)
            .mime_str("audio/wav")?;

        let mut form = multipart::Form::new()
            .part("ref_audio", audio_part)
            .text("ref_text", request.reference_transcript.clone())
            .text("gen_text", request.text.clone())
            .text("speed", request.speed.to_string())
            .text("nfe_step", request.guidance_steps.to_string())
            .text("cfg_strength", request.guidance_strength.to_string())
            .text("target_rms", request.target_loudness.to_string());
        if let Some(seed) = request.seed {
            form = form.text("seed", seed.to_string());
        }
        Ok(form)
    }
}

#[async_trait]
impl SynthesisEngine for HttpSynthesisEngine {
    fn name(&self) -> &str {
        "f5-tts-http"
    }

    async fn ensure_ready(&mut self) -> Result<()> {
        if self.ready {
            return Ok(());
        }

        let url = format!("{}/health", self.endpoint);
        log::debug!("Checking synthesis server at {}", url);

        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                log::info!("Synthesis server is ready at {}", self.endpoint);
                self.ready = true;
                Ok(())
            }
            Ok(response) => Err(TtsArticleError::EngineUnavailable(format!(
                "{} answered with status {}",
                url,
                response.status()
            ))),
            Err(e) => Err(TtsArticleError::EngineUnavailable(format!(
                "{} is unreachable: {}",
                url, e
            ))),
        }
    }

    async fn synthesize(&mut self, request: &SynthesisRequest) -> Result<AudioBuffer> {
        let url = format!("{}/synthesize", self.endpoint);
        let form = Self::build_form(request).await?;

        log::debug!(
            "Sending synthesis request ({} chars) to {}",
            request.text.chars().count(),
            url
        );
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TtsArticleError::Synthesis(format!("Request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = match response.text().await {
                Ok(text) => text,
                Err(e) => format!("Failed to read error response: {}", e),
            };
            return Err(TtsArticleError::Synthesis(format!(
                "Synthesis server returned {}: {}",
                status, error_text
            )));
        }

        let mut file = tokio::fs::File::create(&request.output_path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                TtsArticleError::Synthesis(format!("Failed to read audio stream: {}", e))
            })?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        let output_path = request.output_path.clone();
        tokio::task::spawn_blocking(move || AudioBuffer::read_wav(output_path))
            .await
            .map_err(|e| {
                TtsArticleError::Synthesis(format!("Failed to decode synthesized audio: {}", e))
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    fn request_complete(buf: &[u8]) -> bool {
        let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            return false;
        };
        let head = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
        let body = &buf[pos + 4..];

        let content_length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok());
        if let Some(len) = content_length {
            return body.len() >= len;
        }
        if head.contains("transfer-encoding: chunked") {
            return body.ends_with(b"0\r\n\r\n");
        }
        true
    }

    async fn handle(mut socket: TcpStream, wav: Vec<u8>) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if request_complete(&buf) {
                break;
            }
        }

        let request = String::from_utf8_lossy(&buf);
        let (status, body) = if request.starts_with("GET /health") {
            ("200 OK", b"ok".to_vec())
        } else if request.starts_with("POST /synthesize") && request.contains("gen_text") {
            ("200 OK", wav)
        } else {
            ("404 Not Found", Vec::new())
        };

        let header = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\n\
             Content-Type: audio/wav\r\nConnection: close\r\n\r\n",
            status,
            body.len()
        );
        socket.write_all(header.as_bytes()).await.unwrap();
        socket.write_all(&body).await.unwrap();
        socket.shutdown().await.unwrap();
    }

    async fn spawn_server(wav: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (socket, _) = listener.accept().await.unwrap();
                tokio::spawn(handle(socket, wav.clone()));
            }
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = EngineConfig {
            endpoint: format!("http://127.0.0.1:{}/", port),
            timeout_secs: 5,
        };
        let mut engine = HttpSynthesisEngine::new(&config).unwrap();
        assert_eq!(engine.endpoint(), format!("http://127.0.0.1:{}", port));
        assert!(matches!(engine.ensure_ready().await, Err(TtsArticleError::EngineUnavailable(_))));
    }

    #[tokio::test]
    async fn test_synthesize_writes_server_audio() {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("ref.wav");
        AudioBuffer::silence(100, 24_000, 1).write_wav(&reference).unwrap();

        let served = dir.path().join("served.wav");
        AudioBuffer::new(vec![0.25; 2400], 24_000, 1).write_wav(&served).unwrap();
        let endpoint = spawn_server(std::fs::read(&served).unwrap()).await;

        let mut engine = HttpSynthesisEngine::new(&EngineConfig {
            endpoint,
            timeout_secs: 10,
        })
        .unwrap();
        engine.ensure_ready().await.unwrap();

        let output = dir.path().join("out.wav");
        let request = SynthesisRequest {
            reference_audio: reference,
            reference_transcript: String::new(),
            text: "Hello there".to_string(),
            output_path: output.clone(),
            speed: 1.0,
            guidance_steps: 32,
            guidance_strength: 2.0,
            target_loudness: 0.1,
            seed: Some(7),
        };
        let audio = engine.synthesize(&request).await.unwrap();

        assert!(output.is_file());
        assert_eq!(audio.sample_rate(), 24_000);
        assert_eq!(audio.frames(), 2400);
    }
}
