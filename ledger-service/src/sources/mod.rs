pub mod installation_csv_file;

pub use installation_csv_file::InstallationCsvFileSource;
