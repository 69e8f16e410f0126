macro_rules! cfg_glpk {
    ($($item:item)*) => {
        $(
            #[cfg(feature = "glpk")]
            #[cfg_attr(docsrs, doc(cfg(feature = "glpk")))]
            $item
        )*
    }
}
