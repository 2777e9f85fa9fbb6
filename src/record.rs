use csv::StringRecord;
use serde::Serialize;

use crate::timestamp;

/// Header names of the camera export, mapped by exact match.
pub mod columns {
    pub const INDEX: &str = "Índice";
    pub const LANE: &str = "Pista";
    pub const SIZE_KB: &str = "Tam. (KB)";
    pub const DATETIME: &str = "Hora";
    pub const PLATE: &str = "Nº placa";
    pub const BRAND: &str = "Marca";
    pub const PLATE_COLOR: &str = "Cor placa";
    pub const VEHICLE_COLOR: &str = "Cor veículo";
    pub const SPEED: &str = "Veloc.km/h";
    pub const REGION: &str = "Região";
    pub const EVENT_TYPE: &str = "Tipo evento";
    pub const VEHICLE_SIZE: &str = "Tam. Veíc.";
}

/// One detection event. Field names on the wire follow the dashboard's keys.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct Record {
    #[serde(rename = "indice")]
    pub index: String,
    #[serde(rename = "pista")]
    pub lane: String,
    #[serde(rename = "tam_kb")]
    pub size_kb: String,
    #[serde(rename = "datahora")]
    pub datetime: String,
    pub timestamp: i64,
    #[serde(rename = "nplaca")]
    pub plate: String,
    #[serde(rename = "marca")]
    pub brand: String,
    #[serde(rename = "cor_placa")]
    pub plate_color: String,
    #[serde(rename = "cor_veiculo")]
    pub vehicle_color: String,
    #[serde(rename = "veloc_kmh")]
    pub speed: String,
    #[serde(rename = "regiao")]
    pub region: String,
    #[serde(rename = "tipo_evento")]
    pub event_type: String,
    #[serde(rename = "tamanho_veiculo")]
    pub vehicle_size: String,
}

/// Why a feed row did not become a [`Record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingPlate,
    InvalidTimestamp,
}

/// Column positions resolved once from the header row.
#[derive(Debug, Clone, Default)]
pub struct ColumnIndices {
    index: Option<usize>,
    lane: Option<usize>,
    size_kb: Option<usize>,
    datetime: Option<usize>,
    plate: Option<usize>,
    brand: Option<usize>,
    plate_color: Option<usize>,
    vehicle_color: Option<usize>,
    speed: Option<usize>,
    region: Option<usize>,
    event_type: Option<usize>,
    vehicle_size: Option<usize>,
}

impl ColumnIndices {
    pub fn from_headers(headers: &StringRecord) -> Self {
        let lookup = |name: &str| headers.iter().position(|h| h == name);
        Self {
            index: lookup(columns::INDEX),
            lane: lookup(columns::LANE),
            size_kb: lookup(columns::SIZE_KB),
            datetime: lookup(columns::DATETIME),
            plate: lookup(columns::PLATE),
            brand: lookup(columns::BRAND),
            plate_color: lookup(columns::PLATE_COLOR),
            vehicle_color: lookup(columns::VEHICLE_COLOR),
            speed: lookup(columns::SPEED),
            region: lookup(columns::REGION),
            event_type: lookup(columns::EVENT_TYPE),
            vehicle_size: lookup(columns::VEHICLE_SIZE),
        }
    }

    pub fn has_plate(&self) -> bool {
        self.plate.is_some()
    }

    /// Maps a feed row; absent columns and short rows yield empty fields.
    pub fn to_record(&self, row: &StringRecord) -> Result<Record, Rejection> {
        let field = |idx: Option<usize>| {
            idx.and_then(|i| row.get(i))
                .map(str::to_string)
                .unwrap_or_default()
        };
        let plate = field(self.plate);
        if plate.is_empty() {
            return Err(Rejection::MissingPlate);
        }
        let datetime = field(self.datetime);
        let ts = timestamp::parse(&datetime);
        if ts == timestamp::INVALID {
            return Err(Rejection::InvalidTimestamp);
        }
        Ok(Record {
            index: field(self.index),
            lane: field(self.lane),
            size_kb: field(self.size_kb),
            datetime,
            timestamp: ts,
            plate,
            brand: field(self.brand),
            plate_color: field(self.plate_color),
            vehicle_color: field(self.vehicle_color),
            speed: field(self.speed),
            region: field(self.region),
            event_type: field(self.event_type),
            vehicle_size: field(self.vehicle_size),
        })
    }
}
