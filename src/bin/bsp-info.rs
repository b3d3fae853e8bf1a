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
use std::io::{BufReader, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::process::exit;

use goldsrc::common::{
    bsp::{
        self,
        load::{self as bspload, BspLumpId, LumpDirectory},
        LoadFlags,
    },
    collider::Collider,
};

use docopt::Docopt;

#[derive(Deserialize)]
struct Args {
    cmd_split: bool,
    arg_map: String,
    arg_dest: Option<String>,
    flag_entities: bool,
    flag_help: bool,
    flag_version: bool,
}

const USAGE: &'static str = "
Usage: bsp-info [options] <map>
       bsp-info split <map> <dest>

Options:
    -e, --entities  Print the entity list.

    -h, --help      Show this message and exit.
        --version   Print version information and exit.
";

const VERSION: &'static str = "
bsp-info 0.1
Copyright © 2018 Cormac O'Brien
Released under the terms of the MIT License
";

fn split(map: &str, dest: &str) {
    let mut reader = match File::open(map) {
        Ok(f) => BufReader::new(f),
        Err(why) => {
            println!("Couldn't open {}: {}", map, why);
            exit(1);
        }
    };

    let lumps = match bspload::split_lumps(&mut reader) {
        Ok(l) => l,
        Err(why) => {
            println!("Couldn't read {}: {}", map, why);
            exit(1);
        }
    };

    if let Err(why) = fs::create_dir_all(dest) {
        println!("Couldn't create {}: {}", dest, why);
        exit(1);
    }

    for (id, lump) in BspLumpId::ALL.iter().zip(lumps.iter()) {
        let mut path = PathBuf::from(dest);
        path.push(format!("{:02}_{:?}.lump", *id as usize, id).to_lowercase());

        let result = File::create(&path).and_then(|mut f| f.write_all(lump));
        if let Err(why) = result {
            println!("Couldn't write {}: {}", path.display(), why);
            exit(1);
        }
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

    if args.cmd_split {
        if let Some(ref dest) = args.arg_dest {
            split(&args.arg_map, dest);
        }
        return;
    }

    let mut reader = match File::open(&args.arg_map) {
        Ok(f) => BufReader::new(f),
        Err(why) => {
            println!("Couldn't open {}: {}", &args.arg_map, why);
            exit(1);
        }
    };

    let dir = match LumpDirectory::read_supported(&mut reader) {
        Ok(d) => d,
        Err(why) => {
            println!("Couldn't read {}: {}", &args.arg_map, why);
            exit(1);
        }
    };

    println!("{:<14} {:>10} {:>10}", "Lump", "Offset", "Size");
    for id in BspLumpId::ALL.iter() {
        let lump = dir.lump(*id);
        println!("{:<14} {:>10} {:>10}", format!("{:?}", id), lump.offset, lump.size);
    }

    let mut flags = LoadFlags::VISUALS | LoadFlags::COLLIDERS;
    if args.flag_entities {
        flags |= LoadFlags::ENTITIES;
    }

    let map = match reader
        .seek(SeekFrom::Start(0))
        .map_err(bsp::BspError::from)
        .and_then(|_| bsp::load(&mut reader, flags))
    {
        Ok(m) => m,
        Err(why) => {
            println!("Couldn't load {}: {}", &args.arg_map, why);
            exit(1);
        }
    };

    println!();
    for (i, model) in map.models.iter().enumerate() {
        println!(
            "Model {}: {} points, {} triangles",
            i,
            model.point_count(),
            model.triangle_count()
        );
        for group in model.groups() {
            println!("    {:<16} {:>6} triangles", group.texture(), group.triangle_count());
        }
    }

    for collider in map.colliders.iter() {
        if let Collider::Mesh(ref mesh) = *collider {
            println!(
                "Clip hull: {} vertices, {} triangles",
                mesh.vertices().len(),
                mesh.triangle_count()
            );
        }
    }

    println!();
    for (i, tex) in map.textures.iter().enumerate() {
        println!(
            "Texture {:>3}: {:<16} {}x{}{}",
            i,
            tex.name,
            tex.width,
            tex.height,
            if tex.is_packed() { " (packed)" } else { "" }
        );
    }

    if args.flag_entities {
        for entity in map.entities.iter() {
            println!();
            let mut keys: Vec<_> = entity.keys().collect();
            keys.sort();
            for key in keys {
                println!("\"{}\" \"{}\"", key, entity[key]);
            }
        }
    }
}
