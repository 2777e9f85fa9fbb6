#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const HEADER: &str =
    "Índice,Pista,Tam. (KB),Hora,Nº placa,Marca,Cor placa,Cor veículo,Veloc.km/h,Região,Tipo evento,Tam. Veíc.";

/// Builds one feed line; `speed` is quoted so comma decimals survive.
pub fn row(index: u32, datetime: &str, plate: &str, speed: &str, region: &str) -> String {
    format!("{index},1,120,{datetime},{plate},Fiat,Cinza,Prata,\"{speed}\",{region},Passagem,Médio")
}

pub fn write_feed(dir: &Path, rows: &[String]) -> PathBuf {
    let path = dir.join("placas.csv");
    let mut body = String::from(HEADER);
    body.push('\n');
    for line in rows {
        body.push_str(line);
        body.push('\n');
    }
    fs::write(&path, body).expect("write feed");
    path
}

/// Writes a config next to the feed and returns (tempdir, config path, feed path).
pub fn workspace(rows: &[String]) -> (TempDir, PathBuf, PathBuf) {
    let tmp = tempfile::tempdir().expect("create tempdir");
    let feed = write_feed(tmp.path(), rows);
    let cfg_path = tmp.path().join("platewatch.toml");
    let cfg = format!(
        "service_name = \"it-test\"\nlog_level = \"warn\"\nsource_path = \"{}\"\npage_size = 50\n",
        feed.display()
    );
    fs::write(&cfg_path, cfg).expect("write config");
    (tmp, cfg_path, feed)
}
