pub mod sgdz;
