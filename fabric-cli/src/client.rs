use anyhow::{bail, Context};
use fabric_core::codec::{read_frame, write_frame};
use tokio::net::TcpStream;

/// A thin request/response client. Responses are read back as untyped JSON
/// rather than the Controller's internal `Response` type, since a client is
/// an external collaborator bound only by the wire shape, not the Rust type.
pub struct Client {
    stream: TcpStream,
}

impl Client {
    pub async fn connect(host: &str, port: u16) -> anyhow::Result<Self> {
        let stream = TcpStream::connect((host, port))
            .await
            .with_context(|| format!("connecting to controller at {host}:{port}"))?;
        Ok(Self { stream })
    }

    pub async fn call(&mut self, req: &serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let payload = serde_json::to_vec(req)?;
        write_frame(&mut self.stream, &payload).await?;
        match read_frame(&mut self.stream).await? {
            Some(bytes) => {
                let resp: serde_json::Value = serde_json::from_slice(&bytes)
                    .context("controller sent a response that is not valid JSON")?;
                Ok(resp)
            }
            None => bail!("controller closed the connection without responding"),
        }
    }
}
