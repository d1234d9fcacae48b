pub mod elu;
