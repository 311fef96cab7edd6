#[derive(Debug, Clone)]
pub struct SocketServerConfig {
    pub socket_path: String,
    pub max_connections: usize,
}

impl Default for SocketServerConfig {
    fn default() -> Self {
        Self {
            socket_path: "/tmp/stage-link.sock".to_string(),
            max_connections: 16,
        }
    }
}
