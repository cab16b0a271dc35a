use crate::route::{GeoPoint, RoutePath};
use async_trait::async_trait;

/// Rendering style for the static map image.
#[derive(Debug, Clone)]
pub struct StaticMapStyle {
    pub base_url: String,
    pub width: u32,
    pub height: u32,
}

impl Default for StaticMapStyle {
    fn default() -> Self {
        Self {
            base_url: "https://maps.googleapis.com/maps/api/staticmap".to_string(),
            width: 800,
            height: 400,
        }
    }
}

/// Map backend seam. One provider is active at a time, chosen by
/// configuration, and every caller goes through this interface.
#[async_trait]
pub trait MapProvider: Send + Sync {
    /// Supply the API key fetched from the server before any rendering.
    async fn init(&mut self, api_key: &str) -> Result<(), MapError>;
    fn show_route(
        &mut self,
        route: &RoutePath,
        stations: &[(String, GeoPoint)],
    ) -> Result<(), MapError>;
    fn update_position(&mut self, position: GeoPoint, heading_deg: f64) -> Result<(), MapError>;
    fn render_url(&self) -> Result<String, MapError>;
}

pub fn provider_from_config(
    provider: &str,
    style: StaticMapStyle,
) -> Result<Box<dyn MapProvider>, MapError> {
    match provider {
        "static" => Ok(Box::new(StaticMapProvider::new(style))),
        other => Err(MapError::UnknownProvider(other.to_string())),
    }
}

// Static map URLs have a hard length limit; long polylines get thinned.
const MAX_PATH_POINTS: usize = 64;

/// Provider that renders the journey as a static map image URL.
pub struct StaticMapProvider {
    style: StaticMapStyle,
    api_key: Option<String>,
    route_points: Vec<GeoPoint>,
    stations: Vec<(String, GeoPoint)>,
    marker: Option<(GeoPoint, f64)>,
}

impl StaticMapProvider {
    pub fn new(style: StaticMapStyle) -> Self {
        Self {
            style,
            api_key: None,
            route_points: Vec::new(),
            stations: Vec::new(),
            marker: None,
        }
    }

    fn key(&self) -> Result<&str, MapError> {
        self.api_key.as_deref().ok_or(MapError::NotInitialised)
    }
}

#[async_trait]
impl MapProvider for StaticMapProvider {
    async fn init(&mut self, api_key: &str) -> Result<(), MapError> {
        if api_key.trim().is_empty() {
            return Err(MapError::MissingApiKey);
        }
        self.api_key = Some(api_key.trim().to_string());
        Ok(())
    }

    fn show_route(
        &mut self,
        route: &RoutePath,
        stations: &[(String, GeoPoint)],
    ) -> Result<(), MapError> {
        self.key()?;
        let points = route.points();
        let step = (points.len() / MAX_PATH_POINTS).max(1);
        let mut thinned: Vec<GeoPoint> = points.iter().copied().step_by(step).collect();
        if let Some(last) = points.last() {
            if thinned.last() != Some(last) {
                thinned.push(*last);
            }
        }
        self.route_points = thinned;
        self.stations = stations.to_vec();
        Ok(())
    }

    fn update_position(&mut self, position: GeoPoint, heading_deg: f64) -> Result<(), MapError> {
        self.key()?;
        self.marker = Some((position, heading_deg));
        Ok(())
    }

    fn render_url(&self) -> Result<String, MapError> {
        let key = self.key()?;
        let mut url = format!(
            "{}?size={}x{}",
            self.style.base_url, self.style.width, self.style.height
        );
        if !self.route_points.is_empty() {
            let path: Vec<String> = self
                .route_points
                .iter()
                .map(|point| format!("{:.5},{:.5}", point.lat, point.lng))
                .collect();
            url.push_str("&path=color:0x1a73e8ff|weight:3|");
            url.push_str(&path.join("|"));
        }
        if !self.stations.is_empty() {
            let stops: Vec<String> = self
                .stations
                .iter()
                .map(|(_, point)| format!("{:.5},{:.5}", point.lat, point.lng))
                .collect();
            url.push_str("&markers=size:tiny|");
            url.push_str(&stops.join("|"));
        }
        if let Some((position, _heading)) = &self.marker {
            url.push_str(&format!(
                "&markers=color:red|label:T|{:.5},{:.5}",
                position.lat, position.lng
            ));
        }
        url.push_str(&format!("&key={}", key));
        Ok(url)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Unknown map provider: {0}")]
    UnknownProvider(String),

    #[error("Map API key is missing")]
    MissingApiKey,

    #[error("Map provider is not initialised")]
    NotInitialised,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_route() -> RoutePath {
        RoutePath::new(vec![
            GeoPoint::new(28.6448, 77.2167),
            GeoPoint::new(26.4499, 80.3319),
            GeoPoint::new(22.5726, 88.3639),
        ])
        .unwrap()
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let result = provider_from_config("mapbox", StaticMapStyle::default());
        assert!(matches!(result, Err(MapError::UnknownProvider(name)) if name == "mapbox"));
    }

    #[tokio::test]
    async fn test_empty_api_key_is_rejected() {
        let mut provider = StaticMapProvider::new(StaticMapStyle::default());
        assert!(matches!(provider.init("  ").await, Err(MapError::MissingApiKey)));
    }

    #[tokio::test]
    async fn test_rendering_requires_init() {
        let mut provider = StaticMapProvider::new(StaticMapStyle::default());
        assert!(matches!(provider.render_url(), Err(MapError::NotInitialised)));
        assert!(matches!(
            provider.update_position(GeoPoint::new(0.0, 0.0), 90.0),
            Err(MapError::NotInitialised)
        ));
    }

    #[tokio::test]
    async fn test_render_url_carries_route_marker_and_key() {
        let mut provider = StaticMapProvider::new(StaticMapStyle::default());
        provider.init("test-key-123").await.unwrap();
        provider
            .show_route(
                &sample_route(),
                &[("New Delhi".to_string(), GeoPoint::new(28.6448, 77.2167))],
            )
            .unwrap();
        provider
            .update_position(GeoPoint::new(26.4499, 80.3319), 120.0)
            .unwrap();

        let url = provider.render_url().unwrap();
        assert!(url.starts_with("https://maps.googleapis.com/maps/api/staticmap?size=800x400"));
        assert!(url.contains("&path=color:0x1a73e8ff|weight:3|28.64480,77.21670|"));
        assert!(url.contains("&markers=color:red|label:T|26.44990,80.33190"));
        assert!(url.ends_with("&key=test-key-123"));
    }

    #[tokio::test]
    async fn test_long_routes_are_thinned() {
        let points: Vec<GeoPoint> = (0..500)
            .map(|i| GeoPoint::new(20.0 + i as f64 * 0.01, 75.0))
            .collect();
        let route = RoutePath::new(points).unwrap();

        let mut provider = StaticMapProvider::new(StaticMapStyle::default());
        provider.init("k").await.unwrap();
        provider.show_route(&route, &[]).unwrap();

        let url = provider.render_url().unwrap();
        let path_section = url
            .split("&path=")
            .nth(1)
            .and_then(|rest| rest.split('&').next())
            .unwrap();
        let count = path_section.matches('|').count();
        assert!(count <= MAX_PATH_POINTS + 3);
        // Endpoint survives thinning
        assert!(path_section.ends_with("24.99000,75.00000"));
    }
}
