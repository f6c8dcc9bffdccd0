//! Config serialization to TOML
//!
//! Single source of truth for config file format.

use super::Config;

impl Config {
    /// Serialize config to a commented TOML document
    ///
    /// The ping secret is never written: it only comes from
    /// `RACE_PING_SECRET`.
    pub fn to_toml(&self) -> String {
        format!(
            r#"# racetrack configuration
# Environment variables override these values:
#   RACETRACK_BIND, RACETRACK_DB, RACE_PING_SECRET, RACE_DELAY_MINUTES, RACETRACK_STREAM_URL

# HTTP server bind address
bind_addr = "{bind_addr}"

# SQLite position store
db_path = {db_path:?}

[broadcast]
# Viewers see positions from now - delay_minutes (0 = live)
delay_minutes = {delay_minutes}
poll_interval_secs = {poll_interval_secs}
init_batch = {init_batch}
poll_batch = {poll_batch}

[race]
name = {race_name:?}
distance_km = {distance_km:?}
start = "{start}"
{checkpoints}
{route}

[tracker]
stream_url = {stream_url:?}
reconnect_secs = {reconnect_secs}
replay_interval_ms = {replay_interval_ms}
replay_speed_mps = {replay_speed_mps:?}
smoothing_window = {smoothing_window}
{buffer_limit}

[logging]
level = "{level}"  # RUST_LOG overrides this
file_enabled = {file_enabled}
file_dir = {file_dir:?}
file_rotation = "{file_rotation}"  # hourly, daily, never
file_prefix = {file_prefix:?}
"#,
            bind_addr = self.bind_addr,
            db_path = self.db_path.display().to_string(),
            delay_minutes = self.broadcast.delay_minutes,
            poll_interval_secs = self.broadcast.poll_interval_secs,
            init_batch = self.broadcast.init_batch,
            poll_batch = self.broadcast.poll_batch,
            race_name = self.race.name,
            distance_km = self.race.distance_km,
            start = self.race.start.to_rfc3339(),
            checkpoints = self.checkpoints_to_toml(),
            route = self.route_to_toml(),
            stream_url = self.tracker.stream_url,
            reconnect_secs = self.tracker.reconnect_secs,
            replay_interval_ms = self.tracker.replay_interval_ms,
            replay_speed_mps = self.tracker.replay_speed_mps,
            smoothing_window = self.tracker.smoothing_window,
            buffer_limit = match self.tracker.buffer_limit {
                Some(n) => format!("buffer_limit = {}", n),
                None => "# buffer_limit = 5000  # unbounded when unset".to_string(),
            },
            level = self.logging.level,
            file_enabled = self.logging.file_enabled,
            file_dir = self.logging.file_dir.display().to_string(),
            file_rotation = self.logging.file_rotation.as_str(),
            file_prefix = self.logging.file_prefix,
        )
    }

    /// Checkpoints as an array of inline tables inside [race]
    fn checkpoints_to_toml(&self) -> String {
        let mut output = String::from("checkpoints = [\n");
        for cp in &self.race.checkpoints {
            output.push_str(&format!(
                "  {{ name = {:?}, km = {:?}, lat = {:?}, lng = {:?} }},\n",
                cp.name, cp.km, cp.lat, cp.lng
            ));
        }
        output.push(']');
        output
    }

    fn route_to_toml(&self) -> String {
        let points: Vec<String> = self
            .race
            .route
            .iter()
            .map(|[lat, lng]| format!("[{:?}, {:?}]", lat, lng))
            .collect();
        format!("route = [\n  {}\n]", points.join(",\n  "))
    }
}
