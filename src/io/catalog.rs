//! Product catalog and download client
//!
//! `Catalog` is the seam between the pipeline and the remote archive. The
//! `ODataCatalog` implementation talks to an OData product catalogue
//! (Copernicus Data Space layout): search via `$filter`, full product zips via
//! the download service, attribute lookup with `$expand=Attributes,Assets`.

use crate::config::CatalogConfig;
use crate::io::band_store::StagingDir;
use crate::types::{Candidate, CloudCoverRange, DateRange, GreenscanError, GreenscanResult, RawAttributes};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Search constraints sent to the catalog
#[derive(Debug, Clone)]
pub struct CatalogQuery {
    pub footprint_wkt: String,
    pub date_range: DateRange,
    pub platform: String,
    pub processing_level: String,
    pub cloud_cover: CloudCoverRange,
}

/// Selects which files of a product are retrieved
#[derive(Debug, Clone)]
pub struct BandFilter {
    pattern: Regex,
}

impl BandFilter {
    pub fn new(pattern: &str) -> GreenscanResult<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| GreenscanError::Config(format!("Invalid band filter {}: {}", pattern, e)))?;
        Ok(Self { pattern })
    }

    /// Blue, green, red and near-infrared at 10 m
    pub fn sentinel2_10m() -> GreenscanResult<Self> {
        Self::new(r"_B0[2348]_10m\.jp2$")
    }

    /// 10 m JPEG 2000 files for exactly these band codes
    pub fn for_codes<S: AsRef<str>>(codes: &[S]) -> GreenscanResult<Self> {
        if codes.is_empty() {
            return Err(GreenscanError::Config("Band filter needs at least one code".to_string()));
        }
        let alternatives: Vec<String> = codes.iter().map(|c| regex::escape(c.as_ref())).collect();
        Self::new(&format!(r"_(?:{})_10m\.jp2$", alternatives.join("|")))
    }

    pub fn matches(&self, name: &str) -> bool {
        self.pattern.is_match(name)
    }

    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }
}

/// External product search and retrieval service
pub trait Catalog {
    /// Candidates matching the query, in catalog order
    fn query(&self, query: &CatalogQuery) -> GreenscanResult<Vec<Candidate>>;

    /// Download the files of `product_id` accepted by `filter` below `destination`
    fn fetch(
        &self,
        product_id: &str,
        title: &str,
        filter: &BandFilter,
        destination: &Path,
    ) -> GreenscanResult<Vec<PathBuf>>;

    /// Native attribute mapping of a product
    fn get_attributes(&self, product_id: &str) -> GreenscanResult<RawAttributes>;
}

impl<C: Catalog + ?Sized> Catalog for &C {
    fn query(&self, query: &CatalogQuery) -> GreenscanResult<Vec<Candidate>> {
        (**self).query(query)
    }

    fn fetch(
        &self,
        product_id: &str,
        title: &str,
        filter: &BandFilter,
        destination: &Path,
    ) -> GreenscanResult<Vec<PathBuf>> {
        (**self).fetch(product_id, title, filter, destination)
    }

    fn get_attributes(&self, product_id: &str) -> GreenscanResult<RawAttributes> {
        (**self).get_attributes(product_id)
    }
}

#[derive(Debug, Deserialize)]
struct ODataList {
    value: Vec<ODataProduct>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ODataProduct {
    id: String,
    name: String,
    #[serde(default)]
    content_length: Option<u64>,
    #[serde(default)]
    content_date: Option<ODataContentDate>,
    #[serde(default)]
    footprint: Option<String>,
    #[serde(default)]
    attributes: Vec<ODataAttribute>,
    #[serde(default)]
    assets: Vec<ODataAsset>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ODataContentDate {
    start: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ODataAttribute {
    name: String,
    value: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ODataAsset {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(default)]
    download_link: Option<String>,
}

impl ODataProduct {
    fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.value)
    }

    fn title(&self) -> String {
        self.name.trim_end_matches(".SAFE").to_string()
    }

    fn cloud_cover(&self) -> Option<f64> {
        self.attribute("cloudCover").and_then(Value::as_f64)
    }

    fn acquisition_date(&self) -> Option<DateTime<Utc>> {
        self.content_date
            .as_ref()
            .and_then(|d| DateTime::parse_from_rfc3339(&d.start).ok())
            .map(|d| d.with_timezone(&Utc))
    }
}

/// `geography'SRID=4326;POLYGON((...))'` → `POLYGON((...))`
fn strip_geography(footprint: &str) -> String {
    let inner = footprint
        .trim()
        .trim_start_matches("geography'")
        .trim_end_matches('\'');
    match inner.split_once(';') {
        Some((srid, wkt)) if srid.starts_with("SRID=") => wkt.to_string(),
        _ => inner.to_string(),
    }
}

fn collection_name(platform: &str) -> GreenscanResult<&'static str> {
    match platform {
        "Sentinel-2" => Ok("SENTINEL-2"),
        "Sentinel-1" => Ok("SENTINEL-1"),
        other => Err(GreenscanError::Input(format!("Unsupported platform: {}", other))),
    }
}

fn product_type(processing_level: &str) -> GreenscanResult<&'static str> {
    match processing_level {
        "Level-2A" => Ok("S2MSI2A"),
        "Level-1C" => Ok("S2MSI1C"),
        other => Err(GreenscanError::Input(format!(
            "Unsupported processing level: {}",
            other
        ))),
    }
}

fn processing_level_of(product_type: &str) -> &str {
    match product_type {
        "S2MSI2A" => "Level-2A",
        "S2MSI1C" => "Level-1C",
        other => other,
    }
}

/// OData `$filter` expression for a query
pub fn build_filter(query: &CatalogQuery) -> GreenscanResult<String> {
    let start = query.date_range.start.format("%Y-%m-%dT00:00:00.000Z");
    let end = query.date_range.end.format("%Y-%m-%dT23:59:59.999Z");
    Ok(format!(
        "Collection/Name eq '{}' \
         and OData.CSC.Intersects(area=geography'SRID=4326;{}') \
         and ContentDate/Start ge {} and ContentDate/Start le {} \
         and Attributes/OData.CSC.StringAttribute/any(att:att/Name eq 'productType' and att/OData.CSC.StringAttribute/Value eq '{}') \
         and Attributes/OData.CSC.DoubleAttribute/any(att:att/Name eq 'cloudCover' and att/OData.CSC.DoubleAttribute/Value ge {:.2}) \
         and Attributes/OData.CSC.DoubleAttribute/any(att:att/Name eq 'cloudCover' and att/OData.CSC.DoubleAttribute/Value le {:.2})",
        collection_name(&query.platform)?,
        query.footprint_wkt,
        start,
        end,
        product_type(&query.processing_level)?,
        query.cloud_cover.min,
        query.cloud_cover.max,
    ))
}

/// Parse a search response into candidates, skipping entries without cloud cover
fn parse_candidates(body: &str) -> GreenscanResult<Vec<Candidate>> {
    let list: ODataList = serde_json::from_str(body)
        .map_err(|e| GreenscanError::Catalog(format!("Malformed search response: {}", e)))?;

    let mut candidates = Vec::with_capacity(list.value.len());
    for product in list.value {
        let Some(cloud) = product.cloud_cover() else {
            log::warn!("Product {} has no cloud cover attribute, skipping", product.id);
            continue;
        };
        candidates.push(Candidate {
            id: product.id.clone(),
            title: product.title(),
            cloud_cover_percentage: cloud,
            acquisition_date: product.acquisition_date(),
        });
    }
    Ok(candidates)
}

/// Translate an OData product into the native attribute dictionary
fn to_raw_attributes(product: &ODataProduct) -> RawAttributes {
    let mut raw = RawAttributes::new();
    raw.insert("id".into(), Value::String(product.id.clone()));
    raw.insert("title".into(), Value::String(product.title()));
    raw.insert("Identifier".into(), Value::String(product.title()));

    if let Some(fp) = &product.footprint {
        raw.insert("footprint".into(), Value::String(strip_geography(fp)));
    }
    if let Some(date) = &product.content_date {
        raw.insert("date".into(), Value::String(date.start.clone()));
    }
    if let Some(cloud) = product.attribute("cloudCover") {
        raw.insert("Cloud cover percentage".into(), cloud.clone());
    }
    if let Some(Value::String(kind)) = product.attribute("productType") {
        raw.insert("Product type".into(), Value::String(kind.clone()));
        let level = match product.attribute("processingLevel") {
            Some(Value::String(level)) => level.clone(),
            _ => processing_level_of(kind).to_string(),
        };
        raw.insert("Processing level".into(), Value::String(level));
    }
    if let Some(size) = product.content_length {
        raw.insert("Size".into(), Value::String(format!("{:.2} MB", size as f64 / 1_048_576.0)));
    }
    if let Some(angle) = product.attribute("illuminationAzimuthAngle") {
        raw.insert("Illumination Azimuth Angle".into(), angle.clone());
    }
    if let Some(angle) = product.attribute("illuminationZenithAngle") {
        raw.insert("Illumination Zenith Angle".into(), angle.clone());
    }
    if let Some(link) = product
        .assets
        .iter()
        .find(|a| a.kind.eq_ignore_ascii_case("QUICKLOOK"))
        .and_then(|a| a.download_link.clone())
    {
        raw.insert("quicklook_url".into(), Value::String(link));
    }
    raw
}

/// Extract the archive entries accepted by `filter` below `destination`.
///
/// Entries are unpacked into a staging directory first and only moved under
/// `destination` once the whole archive has been read.
pub fn extract_bands(
    archive: File,
    filter: &BandFilter,
    destination: &Path,
) -> GreenscanResult<Vec<PathBuf>> {
    let mut archive = zip::ZipArchive::new(archive)
        .map_err(|e| GreenscanError::Catalog(format!("Failed to open product archive: {}", e)))?;
    let staging = StagingDir::new(destination)?;

    let mut relative_paths = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| GreenscanError::Catalog(format!("Failed to read archive entry {}: {}", i, e)))?;
        if entry.is_dir() || !filter.matches(entry.name()) {
            continue;
        }
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            log::warn!("Skipping archive entry with unsafe path: {}", entry.name());
            continue;
        };

        let staged = staging.path().join(&relative);
        if let Some(parent) = staged.parent() {
            std::fs::create_dir_all(parent)?;
        }
        log::debug!("Extracting {}", relative.display());

        let mut file = File::create(&staged)?;
        std::io::copy(&mut entry, &mut file).map_err(|e| {
            GreenscanError::Catalog(format!("Failed to extract {}: {}", relative.display(), e))
        })?;
        relative_paths.push(relative);
    }

    let mut extracted = staging.commit(&relative_paths)?;
    extracted.sort();
    Ok(extracted)
}

/// Blocking HTTP client for an OData product catalogue
pub struct ODataCatalog {
    client: reqwest::blocking::Client,
    catalog_url: String,
    download_url: String,
    token: Option<String>,
    max_results: usize,
}

impl ODataCatalog {
    pub fn new(
        catalog_url: &str,
        download_url: &str,
        token: Option<String>,
        timeout: Duration,
        max_results: usize,
    ) -> GreenscanResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("greenscan/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GreenscanError::Catalog(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            catalog_url: catalog_url.trim_end_matches('/').to_string(),
            download_url: download_url.trim_end_matches('/').to_string(),
            token,
            max_results,
        })
    }

    /// Build a client from the `[catalog]` section, reading the token from its environment variable
    pub fn from_config(config: &CatalogConfig) -> GreenscanResult<Self> {
        let token = match &config.token_env {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                GreenscanError::Config(format!("Token variable {} is not set", var))
            })?),
            None => None,
        };
        Self::new(
            &config.url,
            &config.download_url,
            token,
            Duration::from_secs(config.timeout_secs),
            config.max_results,
        )
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder) -> GreenscanResult<reqwest::blocking::Response> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().map_err(map_transport_error)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(GreenscanError::CatalogUnavailable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(GreenscanError::Catalog(format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )));
        }
        Ok(response)
    }

    fn get_text(&self, url: &str, params: &[(&str, String)]) -> GreenscanResult<String> {
        log::debug!("GET {}", url);
        self.send(self.client.get(url).query(params))?
            .text()
            .map_err(map_transport_error)
    }
}

fn map_transport_error(e: reqwest::Error) -> GreenscanError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        GreenscanError::CatalogUnavailable(e.to_string())
    } else {
        GreenscanError::Catalog(e.to_string())
    }
}

impl Catalog for ODataCatalog {
    fn query(&self, query: &CatalogQuery) -> GreenscanResult<Vec<Candidate>> {
        log::info!(
            "Searching catalog: {} {} {} to {}, cloud cover {}-{}%",
            query.platform,
            query.processing_level,
            query.date_range.start,
            query.date_range.end,
            query.cloud_cover.min,
            query.cloud_cover.max
        );
        let url = format!("{}/Products", self.catalog_url);
        let params = [
            ("$filter", build_filter(query)?),
            ("$top", self.max_results.to_string()),
            ("$expand", "Attributes".to_string()),
        ];
        let body = self.get_text(&url, &params)?;
        let candidates = parse_candidates(&body)?;
        log::info!("Catalog returned {} candidates", candidates.len());
        Ok(candidates)
    }

    fn fetch(
        &self,
        product_id: &str,
        title: &str,
        filter: &BandFilter,
        destination: &Path,
    ) -> GreenscanResult<Vec<PathBuf>> {
        log::info!("Downloading product {} ({})", title, product_id);
        std::fs::create_dir_all(destination)?;

        let url = format!("{}/Products({})/$value", self.download_url, product_id);
        let mut response = self.send(self.client.get(&url))?;

        let mut archive = tempfile::tempfile_in(destination)?;
        let bytes = std::io::copy(&mut response, &mut archive)?;
        log::debug!("Downloaded {} bytes", bytes);

        let files = extract_bands(archive, filter, destination)?;
        log::info!("Extracted {} band files matching {}", files.len(), filter.as_str());
        Ok(files)
    }

    fn get_attributes(&self, product_id: &str) -> GreenscanResult<RawAttributes> {
        let url = format!("{}/Products({})", self.catalog_url, product_id);
        let body = self.get_text(&url, &[("$expand", "Attributes,Assets".to_string())])?;
        let product: ODataProduct = serde_json::from_str(&body)
            .map_err(|e| GreenscanError::Catalog(format!("Malformed product response: {}", e)))?;
        Ok(to_raw_attributes(&product))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;

    const SEARCH_RESPONSE: &str = r##"{
        "@odata.context": "$metadata#Products(Attributes())",
        "value": [
            {
                "Id": "a1b2",
                "Name": "S2A_MSIL2A_20221001T105031_N0400_R051_T30TVK_20221001T170221.SAFE",
                "ContentLength": 1048576000,
                "ContentDate": {"Start": "2022-10-01T10:50:31.024Z", "End": "2022-10-01T10:50:31.024Z"},
                "Footprint": "geography'SRID=4326;POLYGON ((-4.0 40.0, -2.8 40.0, -2.8 41.0, -4.0 41.0, -4.0 40.0))'",
                "Attributes": [
                    {"@odata.type": "#OData.CSC.DoubleAttribute", "Name": "cloudCover", "Value": 3.5, "ValueType": "Double"},
                    {"@odata.type": "#OData.CSC.StringAttribute", "Name": "productType", "Value": "S2MSI2A", "ValueType": "String"},
                    {"@odata.type": "#OData.CSC.DoubleAttribute", "Name": "illuminationZenithAngle", "Value": 45.1, "ValueType": "Double"}
                ],
                "Assets": [
                    {"Type": "QUICKLOOK", "Id": "q1", "DownloadLink": "https://example.test/Assets(q1)/$value"}
                ]
            },
            {
                "Id": "c3d4",
                "Name": "S2B_MSIL2A_20221006T105819_N0400_R094_T30TVK_20221006T140000.SAFE",
                "Attributes": []
            }
        ]
    }"##;

    #[test]
    fn test_parse_candidates() {
        let candidates = parse_candidates(SEARCH_RESPONSE).unwrap();
        assert_eq!(candidates.len(), 1);
        let first = &candidates[0];
        assert_eq!(first.id, "a1b2");
        assert_eq!(first.title, "S2A_MSIL2A_20221001T105031_N0400_R051_T30TVK_20221001T170221");
        assert_eq!(first.cloud_cover_percentage, 3.5);
        assert!(first.acquisition_date.is_some());

        assert!(matches!(parse_candidates("<html>"), Err(GreenscanError::Catalog(_))));
    }

    #[test]
    fn test_raw_attributes_use_native_keys() {
        let list: ODataList = serde_json::from_str(SEARCH_RESPONSE).unwrap();
        let raw = to_raw_attributes(&list.value[0]);
        assert_eq!(raw["Cloud cover percentage"], serde_json::json!(3.5));
        assert_eq!(raw["Processing level"], serde_json::json!("Level-2A"));
        assert_eq!(raw["Product type"], serde_json::json!("S2MSI2A"));
        assert_eq!(raw["Size"], serde_json::json!("1000.00 MB"));
        assert!(raw["footprint"].as_str().unwrap().starts_with("POLYGON"));
        assert_eq!(raw["quicklook_url"], serde_json::json!("https://example.test/Assets(q1)/$value"));
        assert!(raw.contains_key("Illumination Zenith Angle"));
        assert!(!raw.contains_key("Illumination Azimuth Angle"));
    }

    fn madrid_query() -> CatalogQuery {
        CatalogQuery {
            footprint_wkt: "POLYGON ((0 0,1 0,1 1,0 0))".to_string(),
            date_range: DateRange::new(
                NaiveDate::from_ymd_opt(2022, 9, 1).unwrap(),
                NaiveDate::from_ymd_opt(2022, 11, 30).unwrap(),
            )
            .unwrap(),
            platform: "Sentinel-2".to_string(),
            processing_level: "Level-2A".to_string(),
            cloud_cover: CloudCoverRange::new(0.0, 10.0).unwrap(),
        }
    }

    #[test]
    fn test_build_filter() {
        let query = madrid_query();
        let filter = build_filter(&query).unwrap();
        assert!(filter.contains("Collection/Name eq 'SENTINEL-2'"));
        assert!(filter.contains("ContentDate/Start ge 2022-09-01T00:00:00.000Z"));
        assert!(filter.contains("ContentDate/Start le 2022-11-30T23:59:59.999Z"));
        assert!(filter.contains("Value eq 'S2MSI2A'"));
        assert!(filter.contains("Value le 10.00"));

        let bad = CatalogQuery { platform: "Landsat-8".to_string(), ..query };
        assert!(matches!(build_filter(&bad), Err(GreenscanError::Input(_))));
    }

    #[test]
    fn test_band_filter_for_codes() {
        let filter = BandFilter::for_codes(&["B02", "B03", "B04", "B8A"]).unwrap();
        assert!(filter.matches("T30TVK_20221001T105031_B8A_10m.jp2"));
        assert!(filter.matches("T30TVK_20221001T105031_B03_10m.jp2"));
        assert!(!filter.matches("T30TVK_20221001T105031_B08_10m.jp2"));
        assert!(!filter.matches("T30TVK_20221001T105031_B02_20m.jp2"));
        assert!(BandFilter::for_codes::<&str>(&[]).is_err());
    }

    #[test]
    fn test_band_filter() {
        let filter = BandFilter::sentinel2_10m().unwrap();
        assert!(filter.matches("GRANULE/L2A_T30TVK/IMG_DATA/R10m/T30TVK_20221001T105031_B04_10m.jp2"));
        assert!(filter.matches("T30TVK_20221001T105031_B08_10m.jp2"));
        assert!(!filter.matches("T30TVK_20221001T105031_B05_20m.jp2"));
        assert!(!filter.matches("T30TVK_20221001T105031_TCI_10m.jp2"));
        assert!(!filter.matches("T30TVK_20221001T105031_B01_10m.jp2"));
    }

    #[test]
    fn test_extract_bands_from_archive() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut archive = tempfile::tempfile().unwrap();
        {
            let mut writer = zip::ZipWriter::new(&mut archive);
            let options = zip::write::FileOptions::default();
            let prefix = "S2A_TEST.SAFE/GRANULE/L2A/IMG_DATA/R10m/";
            for name in ["T30_B02_10m.jp2", "T30_B05_20m.jp2", "T30_B08_10m.jp2"] {
                writer.start_file(format!("{}{}", prefix, name), options).unwrap();
                writer.write_all(b"jp2").unwrap();
            }
            writer.finish().unwrap();
        }

        let files = extract_bands(archive, &BandFilter::sentinel2_10m().unwrap(), dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("S2A_TEST.SAFE/GRANULE/L2A/IMG_DATA/R10m/T30_B02_10m.jp2"));
        assert!(files[1].exists());
    }

    #[test]
    fn test_strip_geography() {
        assert_eq!(
            strip_geography("geography'SRID=4326;POLYGON ((1 2, 3 4))'"),
            "POLYGON ((1 2, 3 4))"
        );
        assert_eq!(strip_geography("POLYGON ((1 2, 3 4))"), "POLYGON ((1 2, 3 4))");
    }

    fn local_catalog(port: u16) -> ODataCatalog {
        let url = format!("http://127.0.0.1:{}/odata/v1", port);
        ODataCatalog::new(&url, &url, None, Duration::from_secs(1), 10).unwrap()
    }

    #[test]
    fn test_refused_connection_is_unavailable() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        // listener dropped, nothing accepts on the port
        let result = local_catalog(port).query(&madrid_query());
        assert!(matches!(result, Err(GreenscanError::CatalogUnavailable(_))));
    }

    #[test]
    fn test_server_error_is_unavailable() {
        use std::io::Read;
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream
                .write_all(b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .unwrap();
        });

        let result = local_catalog(port).query(&madrid_query());
        server.join().unwrap();
        assert!(matches!(result, Err(GreenscanError::CatalogUnavailable(_))));
    }

    #[test]
    fn test_corrupt_archive_extracts_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut bytes = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut bytes);
            let options = zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
            for code in ["B02", "B08"] {
                writer.start_file(format!("R10m/T30_{}_10m.jp2", code), options).unwrap();
                writer.write_all(format!("band-{}-data", code).as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        // damage the second entry's payload so its checksum no longer matches
        let mut bytes = bytes.into_inner();
        let at = bytes.windows(13).position(|w| w == b"band-B08-data").unwrap();
        bytes[at + 5] = b'X';

        let mut archive = tempfile::tempfile().unwrap();
        archive.write_all(&bytes).unwrap();

        let destination = dir.path().join("download");
        let result = extract_bands(archive, &BandFilter::sentinel2_10m().unwrap(), &destination);
        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(&destination).unwrap().count(), 0);
    }
}
