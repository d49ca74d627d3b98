use serde::{Deserialize, Deserializer, Serialize};

/// Stream addresses of one camera, empty when the provider has none
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamUrls {
    pub http: String,
    pub rtmp: String,
    pub rtsp: String,
}

impl StreamUrls {
    /// First available address, in order HTTP, RTMP, RTSP
    pub fn preferred(&self) -> Option<&str> {
        [&self.http, &self.rtmp, &self.rtsp]
            .into_iter()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
    }
}

/// A camera listed by the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub id: String,
    pub name: String,
    pub longitude: String,
    pub latitude: String,
    pub stream_url: StreamUrls,
}

/// Record as published by the open-data provider
#[derive(Debug, Deserialize)]
pub(super) struct RawSource {
    #[serde(rename = "CCTV관리번호", default, deserialize_with = "lenient_string")]
    id: String,
    #[serde(rename = "설치위치명", default, deserialize_with = "lenient_string")]
    name: String,
    #[serde(rename = "경도", default, deserialize_with = "lenient_string")]
    longitude: String,
    #[serde(rename = "위도", default, deserialize_with = "lenient_string")]
    latitude: String,
    #[serde(rename = "스트리밍 프로토콜(HTTP)주소", default, deserialize_with = "lenient_string")]
    http: String,
    #[serde(rename = "스트리밍 프로토콜(RTMP)주소", default, deserialize_with = "lenient_string")]
    rtmp: String,
    #[serde(rename = "스트리밍 프로토콜(RTSP)주소", default, deserialize_with = "lenient_string")]
    rtsp: String,
}

impl From<RawSource> for SourceInfo {
    fn from(raw: RawSource) -> Self {
        Self {
            id: raw.id,
            name: raw.name,
            longitude: raw.longitude,
            latitude: raw.latitude,
            stream_url: StreamUrls {
                http: raw.http,
                rtmp: raw.rtmp,
                rtsp: raw.rtsp,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RawPage {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub data: Vec<RawSource>,
}

/// Strings, numbers and nulls all become strings
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferred_order() {
        let urls = StreamUrls {
            http: String::new(),
            rtmp: "rtmp://cam/live".to_string(),
            rtsp: "rtsp://cam/live".to_string(),
        };
        assert_eq!(urls.preferred(), Some("rtmp://cam/live"));

        let urls = StreamUrls {
            http: "http://cam/live.m3u8".to_string(),
            ..urls
        };
        assert_eq!(urls.preferred(), Some("http://cam/live.m3u8"));
        assert_eq!(StreamUrls::default().preferred(), None);
    }

    #[test]
    fn test_raw_mapping() {
        let raw: RawSource = serde_json::from_str(
            r#"{
                "CCTV관리번호": "C-001",
                "설치위치명": "Gangnam station",
                "경도": 127.0276,
                "위도": "37.4979",
                "스트리밍 프로토콜(RTSP)주소": "rtsp://cam1/live",
                "스트리밍 프로토콜(HTTP)주소": null
            }"#,
        )
        .unwrap();
        let source = SourceInfo::from(raw);

        assert_eq!(source.id, "C-001");
        assert_eq!(source.longitude, "127.0276");
        assert_eq!(source.latitude, "37.4979");
        assert_eq!(source.stream_url.http, "");
        assert_eq!(source.stream_url.rtmp, "");
        assert_eq!(source.stream_url.preferred(), Some("rtsp://cam1/live"));

        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["streamUrl"]["rtsp"], "rtsp://cam1/live");
    }
}
