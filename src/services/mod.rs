pub mod etl;
pub mod meteostat;
pub mod registry;
