//! Test data builders for creating test objects

use rx868_relay::SensorFrame;

/// Builder for creating test SensorFrames
pub struct FrameBuilder {
    frame: SensorFrame,
}

impl FrameBuilder {
    pub fn new(address: u32, sensor_type: u8) -> Self {
        Self {
            frame: SensorFrame::new(address, sensor_type, 20.0),
        }
    }

    pub fn temperature(mut self, value: f32) -> Self {
        self.frame.temperature = value;
        self
    }

    pub fn humidity(mut self, value: f32) -> Self {
        self.frame.humidity = value;
        self
    }

    pub fn pressure(mut self, value: i32) -> Self {
        self.frame.pressure = value;
        self
    }

    pub fn wind(mut self, value: f32) -> Self {
        self.frame.wind = value;
        self
    }

    pub fn rain(mut self, sum: i32, detect: bool) -> Self {
        self.frame.rain_sum = sum;
        self.frame.rain_detect = detect;
        self
    }

    pub fn build(self) -> SensorFrame {
        self.frame
    }
}

/// Minimal valid configuration text with extra TOML appended
pub fn config_toml(extra: &str) -> String {
    format!(
        r#"[mqtt]
server_address = "tcp://127.0.0.1:1883"
client_id = "rx868relay-test"
{}
"#,
        extra
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_builder() {
        let frame = FrameBuilder::new(7, 7)
            .temperature(-3.5)
            .wind(12.0)
            .rain(4, true)
            .build();

        assert_eq!(frame.address, 7);
        assert_eq!(frame.temperature, -3.5);
        assert_eq!(frame.rain_sum, 4);
        assert!(frame.rain_detect);
    }
}
