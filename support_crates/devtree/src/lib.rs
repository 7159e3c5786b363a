//! Library for handling the flattened encoding format ([fdt/dtb](https://devicetree-specification.readthedocs.io/en/latest/chapter5-flattened-format.html))
//! of firmware-provided hardware descriptions during platform bring-up.
#![no_std]

pub mod fdt;
