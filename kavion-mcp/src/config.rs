use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Everything needed to launch and supervise the external Kavion MCP
/// server binary, plus the bridge's own listen settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interpreter for the server entry point.
    pub command: String,

    /// Path to the server's stdio transport entry point.
    pub server_path: PathBuf,

    /// Pass `--read-only` to the server.
    pub read_only: bool,

    /// Feature groups enabled on the server (`--features=a,b`).
    pub features: Vec<String>,

    pub user_email: Option<String>,
    pub user_password: Option<String>,

    /// Supabase project the server connects to, handed down as env vars.
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,

    /// Stdout substring that marks the server as ready.
    pub ready_banner: String,

    /// How long to wait for the initialize handshake.
    pub init_timeout: Duration,

    /// Default deadline for forwarded requests.
    pub request_timeout: Duration,

    /// Pause before respawning an exited server process.
    pub restart_delay: Duration,

    /// Bridge listen address.
    pub bind_addr: String,
    pub bind_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command: "node".to_string(),

            // Relative to the server package root, where the harness
            // normally runs.
            server_path: PathBuf::from("dist/transports/stdio.js"),

            read_only: true,

            features: vec!["database".to_string(), "docs".to_string()],

            user_email: None,
            user_password: None,

            supabase_url: None,
            supabase_anon_key: None,

            ready_banner: "Server connected and ready!".to_string(),

            init_timeout: Duration::from_secs(30),

            request_timeout: Duration::from_secs(60),

            restart_delay: Duration::from_secs(5),

            bind_addr: "0.0.0.0".to_string(),
            bind_port: 3000,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("KAVION_MCP_SERVER") {
            config.server_path = PathBuf::from(path);
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse() {
                config.bind_port = port;
            }
        }
        config.supabase_url = std::env::var("SUPABASE_URL").ok();
        config.supabase_anon_key = std::env::var("SUPABASE_ANON_KEY").ok();
        if let Ok(email) = std::env::var("KAVION_USER_EMAIL") {
            config.user_email = Some(email);
        }
        if let Ok(password) = std::env::var("KAVION_USER_PASSWORD") {
            config.user_password = Some(password);
        }

        config
    }

    pub fn with_server_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.server_path = path.into();
        self
    }

    pub fn with_bind_port(mut self, port: u16) -> Self {
        self.bind_port = port;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_credentials(
        mut self,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.user_email = Some(email.into());
        self.user_password = Some(password.into());
        self
    }

    /// Command-line arguments for the server process, entry point first.
    pub fn server_args(&self) -> Vec<String> {
        let mut args = vec![self.server_path.display().to_string()];
        if self.read_only {
            args.push("--read-only".to_string());
        }
        if !self.features.is_empty() {
            args.push(format!("--features={}", self.features.join(",")));
        }
        if let Some(email) = &self.user_email {
            args.push(format!("--user-email={email}"));
        }
        if let Some(password) = &self.user_password {
            args.push(format!("--user-password={password}"));
        }
        args
    }

    /// Extra environment for the server process.
    pub fn server_env(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        if let Some(url) = &self.supabase_url {
            env.push(("SUPABASE_URL".to_string(), url.clone()));
        }
        if let Some(key) = &self.supabase_anon_key {
            env.push(("SUPABASE_ANON_KEY".to_string(), key.clone()));
        }
        env
    }

    pub fn bind_socket(&self) -> crate::Result<SocketAddr> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse()
            .map_err(|_| {
                crate::Error::InvalidConfig(format!(
                    "invalid bind address {}:{}",
                    self.bind_addr, self.bind_port
                ))
            })
    }

}
