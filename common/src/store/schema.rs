//! Canonical schema DDL, executed at every connection open. Every statement
//! is `IF NOT EXISTS` so opening an existing store file is a no-op migration,
//! per SPEC_FULL.md §6.

pub const DDL: &str = "
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS measurement (
    measurementID INTEGER PRIMARY KEY AUTOINCREMENT,
    measurementStartTime REAL NOT NULL,
    measurementEndTime REAL NOT NULL,
    measurementDuration REAL NOT NULL,
    channel INTEGER NOT NULL,
    averageNoise REAL,
    stdDevNoise REAL,
    hasBeenUploaded INTEGER NOT NULL DEFAULT 0,
    extraJSONData TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_measurement_upload_start
    ON measurement (hasBeenUploaded, measurementStartTime);

CREATE TABLE IF NOT EXISTS station (
    stationID INTEGER PRIMARY KEY AUTOINCREMENT,
    macAddress TEXT NOT NULL UNIQUE,
    extraJSONData TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS serviceSet (
    serviceSetID INTEGER PRIMARY KEY AUTOINCREMENT,
    bssid TEXT NOT NULL UNIQUE,
    networkName BLOB,
    extraJSONData TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS measurementStationMap (
    mapMeasurementID INTEGER NOT NULL REFERENCES measurement (measurementID) ON DELETE CASCADE,
    mapStationID INTEGER NOT NULL REFERENCES station (stationID) ON DELETE CASCADE,
    managementFrameCount INTEGER NOT NULL DEFAULT 0,
    associationFrameCount INTEGER NOT NULL DEFAULT 0,
    reassociationFrameCount INTEGER NOT NULL DEFAULT 0,
    disassociationFrameCount INTEGER NOT NULL DEFAULT 0,
    controlFrameCount INTEGER NOT NULL DEFAULT 0,
    rtsFrameCount INTEGER NOT NULL DEFAULT 0,
    ctsFrameCount INTEGER NOT NULL DEFAULT 0,
    ackFrameCount INTEGER NOT NULL DEFAULT 0,
    dataFrameCount INTEGER NOT NULL DEFAULT 0,
    dataThroughputIn INTEGER NOT NULL DEFAULT 0,
    dataThroughputOut INTEGER NOT NULL DEFAULT 0,
    retryFrameCount INTEGER NOT NULL DEFAULT 0,
    averagePower REAL,
    stdDevPower REAL,
    lowestRate REAL,
    highestRate REAL,
    failedFCSCount INTEGER,
    PRIMARY KEY (mapMeasurementID, mapStationID)
);

CREATE TABLE IF NOT EXISTS infrastructureStationServiceSetMap (
    mapMeasurementID INTEGER NOT NULL REFERENCES measurement (measurementID) ON DELETE CASCADE,
    bssid TEXT NOT NULL,
    macAddress TEXT NOT NULL,
    PRIMARY KEY (mapMeasurementID, bssid, macAddress)
);

CREATE TABLE IF NOT EXISTS associationStationServiceSetMap (
    mapMeasurementID INTEGER NOT NULL REFERENCES measurement (measurementID) ON DELETE CASCADE,
    bssid TEXT NOT NULL,
    macAddress TEXT NOT NULL,
    PRIMARY KEY (mapMeasurementID, bssid, macAddress)
);

CREATE TABLE IF NOT EXISTS serviceSetJitterMeasurement (
    measurementID INTEGER NOT NULL REFERENCES measurement (measurementID) ON DELETE CASCADE,
    serviceSetID INTEGER NOT NULL REFERENCES serviceSet (serviceSetID) ON DELETE CASCADE,
    minJitter REAL NOT NULL,
    maxJitter REAL NOT NULL,
    avgJitter REAL NOT NULL,
    stdDevJitter REAL NOT NULL,
    jitterHistogram BLOB NOT NULL,
    jitterHistogramOffset INTEGER NOT NULL,
    interval INTEGER NOT NULL,
    extraJSONData TEXT NOT NULL DEFAULT '{}',
    PRIMARY KEY (measurementID, serviceSetID)
);

CREATE TABLE IF NOT EXISTS keyValueStore (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";
