// src/banner.rs

/// Prints the application startup banner to the console.
pub fn print_banner() {
    // Using a raw string literal for the multi-line banner
    let banner = r#"
 _ _                              
| (_)_   _____ _ __ ___  ___  __ _ 
| | \ \ / / _ \ '__/ __|/ _ \/ _` |
| | |\ V /  __/ |  \__ \  __/ (_| |
|_|_| \_/ \___|_|  |___/\___|\__, |
                             |___/ 

    Liver Segmentation Client
"#;
    println!("{}", banner);
}
