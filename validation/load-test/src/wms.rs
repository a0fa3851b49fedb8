//! Built-in WMS/tile catalog and user behaviour profiles.
//!
//! Requests target a MapServer CGI endpoint (`/cgi-bin/mapserv`) for WMS and
//! a MapCache endpoint (`/mapcache/{tileset}/{z}/{x}/{y}.png`) for tiles.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::catalog::ParameterDomain;
use crate::descriptor::RequestDescriptor;
use crate::error::ScenarioResult;
use crate::generator::{ScenarioGenerator, ScenarioGeneratorBuilder};
use crate::profile::{Draw, Pacing, ScenarioRule};

pub const MAPSERV_PATH: &str = "/cgi-bin/mapserv";
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:00:00Z";

// Profile names
pub const BASELINE: &str = "baseline";
pub const AGGRESSIVE: &str = "aggressive";
pub const STYLE_COMPARISON: &str = "style_comparison";
pub const MIXED_SOURCE: &str = "mixed_source";

// Domain names
pub const GFS_LAYERS: &str = "gfs_layers";
pub const MRMS_LAYERS: &str = "mrms_layers";
pub const GOES_LAYERS: &str = "goes_layers";
pub const MAPS: &str = "maps";
pub const BBOX_4326: &str = "bbox_4326";
pub const BBOX_CONUS: &str = "bbox_conus";
pub const BBOX_3857: &str = "bbox_3857";
pub const SIZES: &str = "sizes";
pub const CRS: &str = "crs";
pub const FORMATS: &str = "formats";
pub const VERSIONS: &str = "versions";
pub const STYLES: &str = "styles";
pub const ISOTHERMS: &str = "isotherms";
pub const FORECAST_HOURS: &str = "forecast_hours";
pub const ZOOMS: &str = "zooms";
pub const TILESETS: &str = "tilesets";

/// Register the standard WMS parameter domains.
pub fn register_domains(builder: &mut ScenarioGeneratorBuilder) -> ScenarioResult<()> {
    builder
        .register_domain(
            GFS_LAYERS,
            ParameterDomain::values(["t2m", "pwat", "rh2m", "gust", "mslp", "cape", "vis"]),
        )?
        .register_domain(
            MRMS_LAYERS,
            ParameterDomain::values(["refl_composite", "precip_rate", "qpe_01h", "mesh"]),
        )?
        .register_domain(
            GOES_LAYERS,
            ParameterDomain::values(["cmi_c02", "cmi_c09", "cmi_c13"]),
        )?
        .register_domain(MAPS, ParameterDomain::values(["GFS", "MRMS", "GOES"]))?
        .register_domain(
            BBOX_4326,
            ParameterDomain::values(["-125,25,-65,50", "-10,35,40,70"]),
        )?
        .register_domain(
            BBOX_CONUS,
            ParameterDomain::values(["-130,20,-60,55", "-105,30,-90,40", "-82,24,-66,37"]),
        )?
        .register_domain(
            BBOX_3857,
            ParameterDomain::values([
                "-13914936,2875744,-7235766,6446276",
                "-1113195,4163881,4452780,11068716",
            ]),
        )?
        .register_domain(SIZES, ParameterDomain::values(["256", "512", "768", "1024"]))?
        .register_domain(CRS, ParameterDomain::values(["EPSG:4326", "EPSG:3857"]))?
        .register_domain(FORMATS, ParameterDomain::values(["image/png", "image/jpeg"]))?
        .register_domain(VERSIONS, ParameterDomain::values(["1.1.1", "1.3.0"]))?
        .register_domain(STYLES, ParameterDomain::values(["default", "shaded", "contour"]))?
        .register_domain(ISOTHERMS, ParameterDomain::range(200, 320, 5))?
        .register_domain(FORECAST_HOURS, ParameterDomain::range(0, 240, 1))?
        .register_domain(ZOOMS, ParameterDomain::range(0, 8, 1))?
        .register_domain(
            TILESETS,
            ParameterDomain::values(["gfs-t2m", "gfs-mslp", "mrms-refl"]),
        )?;
    Ok(())
}

/// Register the four standard profiles. Domains must be registered first.
pub fn register_profiles(builder: &mut ScenarioGeneratorBuilder) -> ScenarioResult<()> {
    let gfs = GetMapShape::gfs();

    builder
        .register_profile(
            BASELINE,
            vec![
                getmap_rule("getmap", 10, "GetMap [GFS]", gfs),
                tile_rule("gettile", 3, Some("gfs-t2m")),
            ],
            Pacing::between(0.5, 2.0),
        )?
        .register_profile(
            AGGRESSIVE,
            vec![
                getmap_rule(
                    "getmap",
                    10,
                    "GetMap [GFS]",
                    GetMapShape {
                        vary_projection: true,
                        vary_size: true,
                        format: None,
                        ..gfs
                    },
                ),
                tile_rule("gettile", 8, None),
                capabilities_rule("getcapabilities", 2, Some("GFS")),
            ],
            Pacing::between(0.05, 0.25),
        )?
        .register_profile(
            STYLE_COMPARISON,
            vec![
                getmap_rule("getmap_png", 5, "GetMap [GFS png]", gfs),
                getmap_rule(
                    "getmap_jpeg",
                    5,
                    "GetMap [GFS jpeg]",
                    GetMapShape {
                        format: Some("image/jpeg"),
                        ..gfs
                    },
                ),
                getmap_rule(
                    "getmap_styled",
                    3,
                    "GetMap [GFS styled]",
                    GetMapShape { styled: true, ..gfs },
                ),
            ],
            Pacing::between(1.0, 3.0),
        )?
        .register_profile(
            MIXED_SOURCE,
            vec![
                getmap_rule("gfs", 5, "GetMap [GFS]", gfs),
                getmap_rule("mrms", 3, "GetMap [MRMS]", GetMapShape::mrms()),
                getmap_rule("goes", 3, "GetMap [GOES]", GetMapShape::goes()),
                capabilities_rule("getcapabilities", 2, None),
                tile_rule("gettile", 2, None),
            ],
            Pacing::between(0.5, 2.0),
        )?;
    Ok(())
}

/// Builder pre-loaded with the standard domains and profiles.
pub fn standard_builder() -> ScenarioResult<ScenarioGeneratorBuilder> {
    let mut builder = ScenarioGenerator::builder();
    register_domains(&mut builder)?;
    register_profiles(&mut builder)?;
    Ok(builder)
}

/// Generator with the standard catalog, pinned to `reference_time`.
pub fn standard_generator(reference_time: DateTime<Utc>) -> ScenarioResult<ScenarioGenerator> {
    let mut builder = standard_builder()?;
    builder.reference_time(reference_time);
    Ok(builder.build())
}

/// Get the maximum tile coordinate for a zoom level, saturating at `u32::MAX`
/// from zoom 32 up.
pub fn max_tile_for_zoom(zoom: u32) -> u32 {
    1u32.checked_shl(zoom).map_or(u32::MAX, |tiles| tiles - 1)
}

/// Parameter layout of a GetMap rule.
#[derive(Debug, Clone, Copy)]
struct GetMapShape {
    map: &'static str,
    layers: &'static str,
    bbox: &'static str,
    /// Draw VERSION and CRS instead of 1.3.0 / EPSG:4326.
    vary_projection: bool,
    /// Draw WIDTH/HEIGHT instead of 512x512.
    vary_size: bool,
    /// Fixed FORMAT, or `None` to draw one.
    format: Option<&'static str>,
    styled: bool,
    /// Add TIME and RUN relative to the reference time.
    temporal: bool,
    isotherm: bool,
}

impl GetMapShape {
    fn gfs() -> Self {
        Self {
            map: "GFS",
            layers: GFS_LAYERS,
            bbox: BBOX_4326,
            vary_projection: false,
            vary_size: false,
            format: Some("image/png"),
            styled: false,
            temporal: true,
            isotherm: true,
        }
    }

    fn mrms() -> Self {
        Self {
            map: "MRMS",
            layers: MRMS_LAYERS,
            bbox: BBOX_CONUS,
            temporal: false,
            isotherm: false,
            ..Self::gfs()
        }
    }

    fn goes() -> Self {
        Self {
            map: "GOES",
            layers: GOES_LAYERS,
            ..Self::mrms()
        }
    }

    fn domains(&self) -> Vec<&'static str> {
        let mut domains = vec![self.layers, self.bbox];
        if self.vary_projection {
            domains.extend([VERSIONS, CRS, BBOX_3857]);
        }
        if self.vary_size {
            domains.push(SIZES);
        }
        if self.format.is_none() {
            domains.push(FORMATS);
        }
        if self.styled {
            domains.push(STYLES);
        }
        if self.temporal {
            domains.push(FORECAST_HOURS);
        }
        if self.isotherm {
            domains.push(ISOTHERMS);
        }
        domains
    }

    fn render(&self, draw: &mut Draw<'_>, name: &str) -> ScenarioResult<RequestDescriptor> {
        let (version, crs) = if self.vary_projection {
            (draw.pick(VERSIONS)?, draw.pick(CRS)?)
        } else {
            ("1.3.0".to_string(), "EPSG:4326".to_string())
        };
        let bbox = if crs == "EPSG:3857" {
            draw.pick(BBOX_3857)?
        } else {
            draw.pick(self.bbox)?
        };
        let (width, height) = if self.vary_size {
            let size = draw.pick(SIZES)?;
            (size.clone(), size)
        } else {
            ("512".to_string(), "512".to_string())
        };
        let format = match self.format {
            Some(format) => format.to_string(),
            None => draw.pick(FORMATS)?,
        };

        let mut desc = wms_request(name, self.map, &version, "GetMap")
            .param("LAYERS", draw.pick(self.layers)?)
            .param(crs_key(&version), crs)
            .param("BBOX", bbox)
            .param("WIDTH", width)
            .param("HEIGHT", height)
            .param("FORMAT", format);

        if self.styled {
            desc = desc.param("STYLES", draw.pick(STYLES)?);
        }
        if self.temporal {
            let time = forecast_time(draw)?;
            desc = desc.param("TIME", time.clone()).param("RUN", time);
        }
        if self.isotherm {
            desc = desc.param("ISOTHERM", draw.pick(ISOTHERMS)?);
        }
        Ok(desc)
    }
}

fn getmap_rule(rule: &str, weight: u32, display: &str, shape: GetMapShape) -> ScenarioRule {
    let display = display.to_string();
    ScenarioRule::new(rule, weight, move |draw| shape.render(draw, &display)).uses(shape.domains())
}

/// Tile fetch from a fixed tileset, or one drawn from the catalog.
fn tile_rule(rule: &str, weight: u32, tileset: Option<&'static str>) -> ScenarioRule {
    let domains = match tileset {
        Some(_) => vec![ZOOMS],
        None => vec![ZOOMS, TILESETS],
    };
    ScenarioRule::new(rule, weight, move |draw| {
        let tileset = match tileset {
            Some(t) => t.to_string(),
            None => draw.pick(TILESETS)?,
        };
        let z = draw.pick_int(ZOOMS)?;
        let max = i64::from(max_tile_for_zoom(u32::try_from(z).unwrap_or(0)));
        let x = draw.int_in(0, max);
        let y = draw.int_in(0, max);
        Ok(RequestDescriptor::new(
            format!("GetTile [{tileset}]"),
            format!("/mapcache/{tileset}/{z}/{x}/{y}.png"),
        ))
    })
    .uses(domains)
}

/// GetCapabilities for a fixed map, or one drawn from the catalog.
fn capabilities_rule(rule: &str, weight: u32, map: Option<&'static str>) -> ScenarioRule {
    let domains = match map {
        Some(_) => vec![VERSIONS],
        None => vec![VERSIONS, MAPS],
    };
    ScenarioRule::new(rule, weight, move |draw| {
        let map = match map {
            Some(m) => m.to_string(),
            None => draw.pick(MAPS)?,
        };
        let version = draw.pick(VERSIONS)?;
        Ok(wms_request(
            &format!("GetCapabilities [{map}]"),
            &map,
            &version,
            "GetCapabilities",
        ))
    })
    .uses(domains)
}

fn wms_request(name: &str, map: &str, version: &str, request: &str) -> RequestDescriptor {
    RequestDescriptor::new(name, MAPSERV_PATH)
        .param("MAP", map)
        .param("SERVICE", "WMS")
        .param("VERSION", version)
        .param("REQUEST", request)
}

/// WMS 1.1.1 names the projection SRS, 1.3.0 names it CRS.
fn crs_key(version: &str) -> &'static str {
    if version == "1.1.1" {
        "SRS"
    } else {
        "CRS"
    }
}

/// An hour-truncated timestamp up to 240 hours before the reference time.
fn forecast_time(draw: &mut Draw<'_>) -> ScenarioResult<String> {
    let hours = draw.pick_int(FORECAST_HOURS)?;
    let time = draw.reference_time() - ChronoDuration::hours(hours);
    Ok(time.format(TIME_FORMAT).to_string())
}
