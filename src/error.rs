use crate::model::NodeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("longitude {0} out of range [-180, 180]")]
    InvalidLongitude(f64),
    #[error("latitude {0} out of range [-90, 90]")]
    InvalidLatitude(f64),
}

#[derive(Debug, Error)]
pub enum ConditioningError {
    #[error("empty GPS trace")]
    EmptyTrace,
    #[error("all points were dropped by outlier/thinning filters")]
    AllPointsDropped,
    #[error("could not parse timestamp '{0}'")]
    BadTimestamp(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("spatial store query failed: {0}")]
    QueryFailed(String),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("node {0} referenced by a way was not returned by the store")]
    MissingNode(NodeId),
    #[error("way {0} was not loaded into the cache")]
    UnknownWay(crate::model::WayId),
    #[error("segment {1} of way {0} was not registered during cache build")]
    MissingSegment(crate::model::WayId, usize),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Geo(#[from] GeoError),
}

#[derive(Debug, Error)]
pub enum MapMatchError {
    #[error(transparent)]
    Conditioning(#[from] ConditioningError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Geo(#[from] GeoError),
}
