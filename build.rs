#[cfg(feature = "glpk")]
extern crate cc;

fn main() {
    #[cfg(feature = "glpk")]
    {
        println!("cargo:rerun-if-changed=src/ilp/glpk_shim.c");
        cc::Build::new()
            .file("src/ilp/glpk_shim.c")
            .compile("libglpkshim.a");
        println!("cargo:rustc-link-lib=dylib=glpk");
    }
}
