use std::io::Write;

use owo_colors::OwoColorize;
use paperscout_api::Library;
use paperscout_core::RecommendedPaper;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Print the ranked recommendation list.
pub fn print_recommendations(
    w: &mut dyn Write,
    papers: &[RecommendedPaper],
    reference_count: Option<usize>,
    cached: bool,
    color: ColorMode,
) -> std::io::Result<()> {
    let header = match reference_count {
        Some(n) => format!("共推荐 {} 篇论文（基于 {} 篇参考文献）", papers.len(), n),
        None => format!("共推荐 {} 篇论文", papers.len()),
    };
    if color.enabled() {
        writeln!(w, "{}", header.bold())?;
    } else {
        writeln!(w, "{}", header)?;
    }
    if cached {
        let note = "(缓存结果)";
        if color.enabled() {
            writeln!(w, "{}", note.dimmed())?;
        } else {
            writeln!(w, "{}", note)?;
        }
    }
    writeln!(w)?;

    for (i, paper) in papers.iter().enumerate() {
        if color.enabled() {
            writeln!(
                w,
                "{} {} {}",
                format!("[{}]", i + 1).bold().yellow(),
                paper.title.bold(),
                format!("(score {:.3})", paper.score).green()
            )?;
        } else {
            writeln!(
                w,
                "[{}] {} (score {:.3})",
                i + 1,
                paper.title,
                paper.score
            )?;
        }

        if !paper.authors.is_empty() {
            writeln!(w, "  Authors: {}", paper.authors.join("; "))?;
        }
        if let Some(ref date) = paper.date {
            writeln!(w, "  Date:    {}", date)?;
        }
        writeln!(w, "  arXiv:   {}", paper.arxiv_id)?;
        if let Some(ref pdf) = paper.pdf_url {
            writeln!(w, "  PDF:     {}", pdf)?;
        }
        if let Some(ref code) = paper.code_url {
            writeln!(w, "  Code:    {}", code)?;
        }
        if let Some(ref abstract_text) = paper.abstract_text {
            let short = truncate(abstract_text, 240);
            if color.enabled() {
                writeln!(w, "  {}", short.dimmed())?;
            } else {
                writeln!(w, "  {}", short)?;
            }
        }
        writeln!(w)?;
    }
    Ok(())
}

/// Print a successful-but-empty outcome. Distinct from a failure: the server
/// explains why in its own words.
pub fn print_empty_outcome(
    w: &mut dyn Write,
    message: &str,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{}", message.yellow())?;
    } else {
        writeln!(w, "{}", message)?;
    }
    Ok(())
}

/// Print the saved-paper library, flat or grouped by collection.
pub fn print_library(
    w: &mut dyn Write,
    library: &Library,
    collection: Option<&str>,
    by_collection: bool,
    color: ColorMode,
) -> std::io::Result<()> {
    if let Some(name) = collection {
        let papers = library
            .papers_by_collection
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default();
        print_collection_header(w, name, papers.len(), color)?;
        for paper in papers {
            print_library_entry(w, paper, color)?;
        }
        return Ok(());
    }

    if by_collection {
        // Sorted for stable output; HashMap order is arbitrary.
        let mut names: Vec<&String> = library.papers_by_collection.keys().collect();
        names.sort();
        for name in names {
            let papers = &library.papers_by_collection[name];
            print_collection_header(w, name, papers.len(), color)?;
            for paper in papers {
                print_library_entry(w, paper, color)?;
            }
            writeln!(w)?;
        }
        return Ok(());
    }

    writeln!(w, "共 {} 篇论文", library.papers.len())?;
    writeln!(w)?;
    for paper in &library.papers {
        print_library_entry(w, paper, color)?;
    }
    Ok(())
}

fn print_collection_header(
    w: &mut dyn Write,
    name: &str,
    count: usize,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{} ({})", name.bold().cyan(), count)?;
    } else {
        writeln!(w, "{} ({})", name, count)?;
    }
    Ok(())
}

fn print_library_entry(
    w: &mut dyn Write,
    paper: &paperscout_core::Paper,
    color: ColorMode,
) -> std::io::Result<()> {
    let authors = if paper.authors.is_empty() {
        String::new()
    } else {
        format!(" — {}", truncate(&paper.authors.join("; "), 80))
    };
    if color.enabled() {
        writeln!(
            w,
            "  {} {}{}",
            paper.key.dimmed(),
            paper.title,
            authors.dimmed()
        )?;
    } else {
        writeln!(w, "  {} {}{}", paper.key, paper.title, authors)?;
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let cut: String = s.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        s.to_string()
    }
}
