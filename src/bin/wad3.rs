// Copyright © 2018 Cormac O'Brien
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

#[macro_use]
extern crate serde_derive;

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::exit;

use goldsrc::common::wad::{MipLevel, MipTexture, MipmapAlgorithm, QuantizeAlgorithm, Wad};

use docopt::Docopt;

#[derive(Deserialize)]
struct Args {
    cmd_list: bool,
    cmd_extract: bool,
    cmd_build: bool,
    arg_wad: String,
    arg_dest: Option<String>,
    arg_image: Vec<String>,
    flag_palette: String,
    flag_mipmap: String,
    flag_help: bool,
    flag_version: bool,
}

const USAGE: &'static str = "
Usage: wad3 list <wad>
       wad3 extract <wad> <dest>
       wad3 build [options] <wad> <image>...

Options:
    --palette=<alg>  Color reduction for images with more than 256 colors:
                     most-used-rgb, most-used-hsb, basic-rgb or basic-hsb.
                     [default: basic-hsb]
    --mipmap=<alg>   Mipmap generation: first-pixel or crop-center.
                     [default: first-pixel]

    -h, --help       Show this message and exit.
        --version    Print version information and exit.
";

const VERSION: &'static str = "
wad3 0.1
Copyright © 2018 Cormac O'Brien
Released under the terms of the MIT License
";

fn parse_palette(name: &str) -> Option<QuantizeAlgorithm> {
    match name {
        "most-used-rgb" => Some(QuantizeAlgorithm::MostUsedRgb),
        "most-used-hsb" => Some(QuantizeAlgorithm::MostUsedHsb),
        "basic-rgb" => Some(QuantizeAlgorithm::BasicPaletteRgb),
        "basic-hsb" => Some(QuantizeAlgorithm::BasicPaletteHsb),
        _ => None,
    }
}

fn parse_mipmap(name: &str) -> Option<MipmapAlgorithm> {
    match name {
        "first-pixel" => Some(MipmapAlgorithm::FirstPixel),
        "crop-center" => Some(MipmapAlgorithm::CropCenter),
        _ => None,
    }
}

fn open_wad(path: &str) -> Wad {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(why) => {
            println!("Couldn't open {}: {}", path, why);
            exit(1);
        }
    };

    match Wad::load(file) {
        Ok(w) => w,
        Err(why) => {
            println!("Couldn't read {}: {}", path, why);
            exit(1);
        }
    }
}

fn list(path: &str) {
    let wad = open_wad(path);
    for tex in wad.textures() {
        println!("{:<16} {:>4}x{:<4}", tex.name(), tex.width(), tex.height());
    }

    for skipped in wad.skipped() {
        println!("{:<16} skipped: {:?}", skipped.name, skipped.reason);
    }
}

fn extract(path: &str, dest: &str) {
    let wad = open_wad(path);

    if let Err(why) = fs::create_dir_all(dest) {
        println!("Couldn't create {}: {}", dest, why);
        exit(1);
    }

    for tex in wad.textures() {
        let mut out = PathBuf::from(dest);
        out.push(format!("{}.png", tex.name()));

        let image = match tex.to_rgba(MipLevel::Full) {
            Some(i) => i,
            None => {
                println!("Texture {} has no image data", tex.name());
                continue;
            }
        };

        if let Err(why) = image.save(&out) {
            println!("Couldn't write {}: {}", out.display(), why);
            exit(1);
        }
    }
}

fn load_texture(path: &Path, palette: QuantizeAlgorithm, mipmap: MipmapAlgorithm) -> MipTexture {
    let name = match path.file_stem().and_then(|s| s.to_str()) {
        Some(n) => n.to_owned(),
        None => {
            println!("Couldn't derive a texture name from {}", path.display());
            exit(1);
        }
    };

    let image = match image::open(path) {
        Ok(i) => i.to_rgb8(),
        Err(why) => {
            println!("Couldn't open {}: {}", path.display(), why);
            exit(1);
        }
    };

    let mut tex = match MipTexture::from_rgb_image(&name, &image, palette) {
        Ok(t) => t,
        Err(why) => {
            println!("Couldn't convert {}: {}", path.display(), why);
            exit(1);
        }
    };

    tex.generate_mipmaps(mipmap);
    tex
}

fn build(path: &str, images: &[String], palette: QuantizeAlgorithm, mipmap: MipmapAlgorithm) {
    let mut wad = Wad::new();
    for image in images {
        wad.add_texture(load_texture(Path::new(image), palette, mipmap));
    }

    let mut writer = match File::create(path) {
        Ok(f) => BufWriter::new(f),
        Err(why) => {
            println!("Couldn't create {}: {}", path, why);
            exit(1);
        }
    };

    if let Err(why) = wad.write(&mut writer) {
        println!("Couldn't write {}: {}", path, why);
        exit(1);
    }
}

fn main() {
    env_logger::init();

    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    if args.flag_help {
        println!("{}", USAGE);
        exit(0);
    }

    if args.flag_version {
        println!("{}", VERSION);
        exit(0);
    }

    if args.cmd_list {
        list(&args.arg_wad);
    } else if args.cmd_extract {
        if let Some(ref dest) = args.arg_dest {
            extract(&args.arg_wad, dest);
        }
    } else if args.cmd_build {
        let palette = match parse_palette(&args.flag_palette) {
            Some(p) => p,
            None => {
                println!("Unknown palette algorithm {}", args.flag_palette);
                exit(1);
            }
        };

        let mipmap = match parse_mipmap(&args.flag_mipmap) {
            Some(m) => m,
            None => {
                println!("Unknown mipmap algorithm {}", args.flag_mipmap);
                exit(1);
            }
        };

        build(&args.arg_wad, &args.arg_image, palette, mipmap);
    }
}
