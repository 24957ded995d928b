pub mod companion;
