pub mod cli;
pub mod error;

pub mod commands {
    pub mod import;
}

pub mod core {
    pub mod header;
    pub mod header_merge;
    pub mod interval;
    pub mod record;
    pub mod registry;
}

pub mod io {
    pub mod sample_reader;
    pub mod vcf_reader;
    #[cfg(test)]
    pub mod test_utils;
}

pub mod import;
pub mod store;

pub mod utils {
    pub mod util;
}

pub mod constants;

pub use constants::*;
