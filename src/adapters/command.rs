//! Model renderer backed by external commands.
//!
//! Shells out twice per preview: a decoder that turns a model file into an
//! intermediate mesh, then a renderer that rasterizes the mesh.
//!
//! ```text
//! <decoder...> <model.mbac> <mesh.obj>
//! <renderer...> <mesh.obj> <output.png> --resolution WxH \
//!     --axis-forward F --axis-up U [--texture <texture.png>]
//! ```
//!
//! No timeout is applied; a hung renderer hangs the batch.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{Geometry, ModelRenderer, RenderError, RenderRequest};

/// Intermediate format produced by the decoder
const MESH_FORMAT: &str = "obj";

/// Renderer using subprocess mode
#[derive(Debug, Clone, Default)]
pub struct CommandRenderer {
    /// Decoder program followed by leading arguments
    decoder: Vec<String>,

    /// Renderer program followed by leading arguments
    renderer: Vec<String>,
}

impl CommandRenderer {
    pub fn new(decoder: Vec<String>, renderer: Vec<String>) -> Self {
        Self { decoder, renderer }
    }

    async fn run(
        command: &[String],
        extra_args: Vec<OsString>,
        what: &'static str,
    ) -> Result<(), RenderError> {
        let (program, args) = command
            .split_first()
            .ok_or(RenderError::NotConfigured(what))?;

        debug!(program = %program, ?extra_args, "Spawning {}", what);

        let output = Command::new(program)
            .args(args)
            .args(extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            let message = format!(
                "{} '{}' failed with exit code {}: {}",
                what,
                program,
                exit_code,
                stderr.trim()
            );
            return Err(match what {
                "decoder" => RenderError::Decode(message),
                _ => RenderError::Render(message),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl ModelRenderer for CommandRenderer {
    fn name(&self) -> &str {
        "command"
    }

    async fn decode(&self, model: &[u8]) -> Result<Geometry, RenderError> {
        let dir = tempfile::tempdir()?;
        let model_path = dir.path().join("model.mbac");
        let mesh_path = dir.path().join(format!("model.{}", MESH_FORMAT));

        tokio::fs::write(&model_path, model).await?;

        Self::run(
            &self.decoder,
            vec![model_path.into_os_string(), mesh_path.clone().into_os_string()],
            "decoder",
        )
        .await?;

        let data = tokio::fs::read(&mesh_path).await.map_err(|e| {
            RenderError::Decode(format!("decoder produced no mesh: {}", e))
        })?;

        Ok(Geometry {
            format: MESH_FORMAT.to_string(),
            data,
        })
    }

    async fn render(
        &self,
        geometry: &Geometry,
        request: &RenderRequest,
        output: &Path,
    ) -> Result<(), RenderError> {
        let dir = tempfile::tempdir()?;
        let mesh_path = dir.path().join(format!("mesh.{}", geometry.format));
        tokio::fs::write(&mesh_path, &geometry.data).await?;

        let (width, height) = request.resolution;
        let mut args: Vec<OsString> = vec![
            mesh_path.into_os_string(),
            output.as_os_str().to_os_string(),
            "--resolution".into(),
            format!("{}x{}", width, height).into(),
            "--axis-forward".into(),
            request.orientation.forward.clone().into(),
            "--axis-up".into(),
            request.orientation.up.clone().into(),
        ];
        if let Some(texture) = &request.texture {
            args.push("--texture".into());
            args.push(texture.as_os_str().to_os_string());
        }

        Self::run(&self.renderer, args, "renderer").await?;

        if !output.is_file() {
            return Err(RenderError::Render(format!(
                "renderer did not write {}",
                output.display()
            )));
        }

        Ok(())
    }
}
